use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CinemaError;

/// The two playback-server families we know how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vendor {
    /// Vendor A
    #[serde(rename = "IMS3000")]
    Ims3000,
    /// Vendor B
    #[serde(rename = "DCP2000")]
    Dcp2000,
}

/// How a 200 login response without login markers gets confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyConfirmation {
    /// GET the index page and require it not to be a login page.
    IndexProbe,
    /// The login response body itself is proof enough.
    Direct,
}

/// Result of executing a macro, judged per vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroAck {
    /// Any HTTP 200 counts.
    Status,
    /// HTTP 200 and the body must mention this token.
    BodyContains(&'static str),
}

/// Everything that differs between the vendors, in one place.
#[derive(Debug, Clone, Copy)]
pub struct VendorProfile {
    pub login_path: &'static str,
    pub login_referer_path: &'static str,
    /// Vendor-specific trailing form fields, appended after username/password.
    pub login_extra_fields: &'static [(&'static str, &'static str)],
    pub body_confirmation: BodyConfirmation,
    pub logout_path: &'static str,
    pub logout_referer_path: &'static str,
    pub playback_page_path: &'static str,
    pub macro_path: &'static str,
    pub macro_ack: MacroAck,
}

const IMS3000_PROFILE: VendorProfile = VendorProfile {
    login_path: "/web/login.php",
    login_referer_path: "/web/login.php",
    login_extra_fields: &[("from", ""), ("screen", "false")],
    body_confirmation: BodyConfirmation::IndexProbe,
    logout_path: "/web/logout/",
    logout_referer_path: "/web/index.php",
    playback_page_path: "/web/index.php?page=sys_control/cinelister/playback.php",
    macro_path: "/web/js/ajax_common.php",
    macro_ack: MacroAck::Status,
};

const DCP2000_PROFILE: VendorProfile = VendorProfile {
    login_path: "/web/index.php",
    login_referer_path: "/web/index.php",
    login_extra_fields: &[("screen", "auto")],
    body_confirmation: BodyConfirmation::Direct,
    logout_path: "/web/logout/index.php",
    logout_referer_path: "/web/overview/",
    playback_page_path: "/web/sys_control/cinelister/playback.php",
    macro_path: "/web/ajax_common.php",
    macro_ack: MacroAck::BodyContains("Executed"),
};

impl Vendor {
    pub const ALL: [Vendor; 2] = [Vendor::Ims3000, Vendor::Dcp2000];

    pub fn profile(self) -> &'static VendorProfile {
        match self {
            Vendor::Ims3000 => &IMS3000_PROFILE,
            Vendor::Dcp2000 => &DCP2000_PROFILE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Vendor::Ims3000 => "IMS3000",
            Vendor::Dcp2000 => "DCP2000",
        }
    }

    /// Login order: the hinted vendor first, then the other one.
    /// Without a hint, vendor A goes first.
    pub fn login_order(hint: Option<Vendor>) -> [Vendor; 2] {
        match hint {
            Some(Vendor::Dcp2000) => [Vendor::Dcp2000, Vendor::Ims3000],
            _ => [Vendor::Ims3000, Vendor::Dcp2000],
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = CinemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IMS3000" => Ok(Vendor::Ims3000),
            "DCP2000" => Ok(Vendor::Dcp2000),
            other => Err(CinemaError::InvalidConfig(format!(
                "unknown server type: {}",
                other
            ))),
        }
    }
}

impl VendorProfile {
    pub fn is_macro_success(&self, status: u16, body: &str) -> bool {
        match self.macro_ack {
            MacroAck::Status => status == 200,
            MacroAck::BodyContains(token) => status == 200 && body.contains(token),
        }
    }
}
