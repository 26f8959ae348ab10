//! Camera model table and capability resolution
//!
//! Inventory data only carries a product model string. Everything the bridge
//! needs to know about a model (is it a camera at all, can it pan/tilt, does it
//! stream 2K) is resolved here once, when a `Device` is built.

use serde::ser::{Serialize, SerializeSeq, Serializer};

/// A single device capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Video stream
    Video,
    /// Audio stream
    Audio,
    /// Pan/tilt motor
    PanTilt,
}

impl Capability {
    const ALL: [Capability; 3] = [Capability::Video, Capability::Audio, Capability::PanTilt];

    fn bit(self) -> u8 {
        match self {
            Capability::Video => 0b001,
            Capability::Audio => 0b010,
            Capability::PanTilt => 0b100,
        }
    }

    /// Wire name used on the control channel
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Video => "video",
            Capability::Audio => "audio",
            Capability::PanTilt => "ptz",
        }
    }
}

/// Set of capabilities, serialized as a list of names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// Empty set
    pub fn empty() -> Self {
        Self(0)
    }

    /// Add a capability
    pub fn with(mut self, cap: Capability) -> Self {
        self.0 |= cap.bit();
        self
    }

    /// Check membership
    pub fn contains(&self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    /// Iterate in a stable order (video, audio, ptz)
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }

    /// Capability names in stable order
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(Capability::as_str).collect()
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for cap in self.iter() {
            seq.serialize_element(cap.as_str())?;
        }
        seq.end()
    }
}

/// Session quality parameters handed to the native session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamQuality {
    /// Vendor frame-size code
    pub frame_size: u8,
    /// Requested bitrate (vendor units)
    pub bitrate: u16,
}

impl StreamQuality {
    /// 2K main stream
    pub const HD_2K: StreamQuality = StreamQuality {
        frame_size: 3,
        bitrate: 240,
    };

    /// 1080p main stream
    pub const HD_1080P: StreamQuality = StreamQuality {
        frame_size: 1,
        bitrate: 160,
    };
}

/// Everything known about a camera model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelProfile {
    /// Product model code as reported by the inventory
    pub code: &'static str,
    /// Human readable model name
    pub name: &'static str,
    /// Has a pan/tilt motor
    pub pan_tilt: bool,
    /// Streams 2K
    pub hd_2k: bool,
}

impl ModelProfile {
    /// Look up a known camera model
    ///
    /// Returns `None` for models that are not cameras (plugs, bulbs, sensors)
    /// or that this bridge does not know about.
    pub fn lookup(code: &str) -> Option<ModelProfile> {
        CAMERA_MODELS
            .iter()
            .find(|(c, _)| *c == code)
            .map(|&(code, name)| ModelProfile {
                code,
                name,
                pan_tilt: code.contains("PAN") || code.contains("CP1"),
                hd_2k: HD_2K_MODELS.contains(&code),
            })
    }

    /// Capabilities of this model
    pub fn capabilities(&self) -> CapabilitySet {
        let caps = CapabilitySet::empty()
            .with(Capability::Video)
            .with(Capability::Audio);
        if self.pan_tilt {
            caps.with(Capability::PanTilt)
        } else {
            caps
        }
    }

    /// Session quality for this model
    pub fn quality(&self) -> StreamQuality {
        if self.hd_2k {
            StreamQuality::HD_2K
        } else {
            StreamQuality::HD_1080P
        }
    }
}

const CAMERA_MODELS: &[(&str, &str)] = &[
    ("WYZECP1", "Cam Pan"),
    ("WYZEC1", "Cam v1"),
    ("WYZEC1-JZ", "Cam v2"),
    ("WYZE_CAKP2", "Cam v3"),
    ("HL_CAM3P", "Cam v3 Pro"),
    ("HL_CAM4", "Cam v4"),
    ("HL_PAN2", "Cam Pan v2"),
    ("HL_PAN3", "Cam Pan v3"),
    ("HL_PANP", "Cam Pan Pro"),
    ("WYZEDB3", "Video Doorbell v1"),
    ("HL_DB2", "Video Doorbell v2"),
    ("GW_BE1", "Video Doorbell v2"),
    ("GW_GC1", "Video Doorbell Pro"),
    ("AN_RSCW", "Cam OG"),
    ("AN_RLT", "Cam OG Telephoto"),
    ("HL_WCO2", "Cam Outdoor v2"),
    ("WVOD1", "Cam Outdoor v1"),
    ("HL_CFL1", "Cam Floodlight"),
    ("HL_CFL2", "Cam Floodlight v2"),
];

const HD_2K_MODELS: &[&str] = &["HL_CAM3P", "HL_CAM4", "HL_PANP", "HL_DB2", "HL_CFL2"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_unknown_model() {
        assert!(ModelProfile::lookup("WLPP1").is_none()); // smart plug
        assert!(ModelProfile::lookup("").is_none());
    }

    #[test]
    fn test_pan_cam_has_ptz() {
        let profile = ModelProfile::lookup("HL_PAN3").unwrap();
        assert!(profile.pan_tilt);
        assert_eq!(profile.capabilities().names(), vec!["video", "audio", "ptz"]);

        let profile = ModelProfile::lookup("WYZECP1").unwrap();
        assert!(profile.pan_tilt);
    }

    #[test]
    fn test_fixed_cam_capabilities() {
        let profile = ModelProfile::lookup("WYZE_CAKP2").unwrap();
        assert!(!profile.pan_tilt);
        assert!(!profile.capabilities().contains(Capability::PanTilt));
        assert_eq!(profile.name, "Cam v3");
    }

    #[test]
    fn test_quality() {
        assert_eq!(
            ModelProfile::lookup("HL_CAM3P").unwrap().quality(),
            StreamQuality::HD_2K
        );
        assert_eq!(
            ModelProfile::lookup("WYZEC1-JZ").unwrap().quality(),
            StreamQuality::HD_1080P
        );
    }

    #[test]
    fn test_capability_set_serializes_as_list() {
        let caps = CapabilitySet::empty()
            .with(Capability::PanTilt)
            .with(Capability::Video);
        let json = serde_json::to_string(&caps).unwrap();
        assert_eq!(json, r#"["video","ptz"]"#);
    }
}
