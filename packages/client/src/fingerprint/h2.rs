//! HTTP/2 connection fingerprint: ordered SETTINGS, connection window
//! delta, PRIORITY pre-frames and pseudo-header permutation.
//!
//! The identifier order of the initial SETTINGS frame and the frames that
//! follow it are observable by the server and feed Akamai-style fingerprints,
//! so everything here is ordered data, never a map.

use crate::http::headers::PseudoOrder;

/// HTTP/2 SETTINGS identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SettingId {
    HeaderTableSize = 0x1,
    EnablePush = 0x2,
    MaxConcurrentStreams = 0x3,
    InitialWindowSize = 0x4,
    MaxFrameSize = 0x5,
    MaxHeaderListSize = 0x6,
}

impl SettingId {
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// A PRIORITY frame emitted at connection start (or attached to HEADERS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    pub stream_id: u32,
    pub depends_on: u32,
    pub exclusive: bool,
    /// Wire weight (0..=255, meaning weight-1 per RFC 9113).
    pub weight: u8,
}

/// The full HTTP/2 half of a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Http2Settings {
    /// SETTINGS in emission order.
    pub settings: Vec<(SettingId, u32)>,
    /// Connection-level WINDOW_UPDATE increment sent right after SETTINGS;
    /// zero suppresses the frame.
    pub connection_flow: u32,
    /// PRIORITY frames emitted before the first request.
    pub priorities: Vec<Priority>,
    /// Priority attached to request HEADERS frames, when set.
    pub header_priority: Option<Priority>,
    pub pseudo_order: PseudoOrder,
}

impl Default for Http2Settings {
    fn default() -> Self {
        Self {
            settings: vec![
                (SettingId::HeaderTableSize, 4096),
                (SettingId::EnablePush, 0),
                (SettingId::InitialWindowSize, 65535),
            ],
            connection_flow: 0,
            priorities: Vec::new(),
            header_priority: None,
            pseudo_order: PseudoOrder::default(),
        }
    }
}

impl Http2Settings {
    /// Value of a setting, if present.
    pub fn get(&self, id: SettingId) -> Option<u32> {
        self.settings
            .iter()
            .find(|(sid, _)| *sid == id)
            .map(|(_, v)| *v)
    }

    /// Set or append a setting without disturbing the existing order.
    pub fn set(&mut self, id: SettingId, value: u32) {
        match self.settings.iter_mut().find(|(sid, _)| *sid == id) {
            Some(slot) => slot.1 = value,
            None => self.settings.push((id, value)),
        }
    }

    /// The Akamai fingerprint text
    /// `settings|window_update|priority|pseudo_order`.
    pub fn akamai_fingerprint(&self) -> String {
        let settings = self
            .settings
            .iter()
            .map(|(id, value)| format!("{}:{}", id.code(), value))
            .collect::<Vec<_>>()
            .join(";");
        let window = if self.connection_flow == 0 {
            "00".to_string()
        } else {
            self.connection_flow.to_string()
        };
        let priority = if self.priorities.is_empty() {
            "0".to_string()
        } else {
            self.priorities
                .iter()
                .map(|p| {
                    format!(
                        "{}:{}:{}:{}",
                        p.stream_id,
                        u8::from(p.exclusive),
                        p.depends_on,
                        u16::from(p.weight) + 1
                    )
                })
                .collect::<Vec<_>>()
                .join(",")
        };
        format!(
            "{}|{}|{}|{}",
            settings,
            window,
            priority,
            self.pseudo_order.akamai()
        )
    }

    /// Canonical byte serialization used in transport-cache keys.
    pub fn cache_key_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.settings.len() * 6 + 16);
        for (id, value) in &self.settings {
            out.extend_from_slice(&id.code().to_be_bytes());
            out.extend_from_slice(&value.to_be_bytes());
        }
        out.extend_from_slice(&self.connection_flow.to_be_bytes());
        for p in &self.priorities {
            out.extend_from_slice(&p.stream_id.to_be_bytes());
            out.extend_from_slice(&p.depends_on.to_be_bytes());
            out.push(u8::from(p.exclusive));
            out.push(p.weight);
        }
        if let Some(p) = self.header_priority {
            out.extend_from_slice(&p.stream_id.to_be_bytes());
            out.extend_from_slice(&p.depends_on.to_be_bytes());
            out.push(u8::from(p.exclusive));
            out.push(p.weight);
        }
        out.extend_from_slice(self.pseudo_order.akamai().as_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn akamai_text_orders_settings_as_configured() {
        let mut h2 = Http2Settings {
            settings: vec![
                (SettingId::HeaderTableSize, 65536),
                (SettingId::EnablePush, 0),
                (SettingId::InitialWindowSize, 6_291_456),
                (SettingId::MaxHeaderListSize, 262_144),
            ],
            connection_flow: 15_663_105,
            priorities: Vec::new(),
            header_priority: None,
            pseudo_order: PseudoOrder::masp(),
        };
        assert_eq!(
            h2.akamai_fingerprint(),
            "1:65536;2:0;4:6291456;6:262144|15663105|0|m,a,s,p"
        );

        h2.set(SettingId::EnablePush, 1);
        assert_eq!(h2.get(SettingId::EnablePush), Some(1));
        // order unchanged by set()
        assert!(h2.akamai_fingerprint().starts_with("1:65536;2:1;"));
    }

    #[test]
    fn cache_key_distinguishes_order() {
        let a = Http2Settings {
            settings: vec![(SettingId::HeaderTableSize, 1), (SettingId::EnablePush, 0)],
            ..Http2Settings::default()
        };
        let b = Http2Settings {
            settings: vec![(SettingId::EnablePush, 0), (SettingId::HeaderTableSize, 1)],
            ..Http2Settings::default()
        };
        assert_ne!(a.cache_key_bytes(), b.cache_key_bytes());
    }
}
