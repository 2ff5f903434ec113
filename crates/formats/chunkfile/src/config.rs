use serde::{Deserialize, Serialize};

/// What to do when a typed audio record and the names list disagree about a slot's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Log a warning and keep the typed record's name.
    #[default]
    Warn,
    /// Fail the decode.
    Error,
}

/// Options shared by the decoders and encoders.
///
/// Everything is on by default; the error policy for name mismatches is opt-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub name_mismatch: MismatchPolicy,
    /// Warn when a decoded orientation is not orthonormal.
    pub check_orthonormal: bool,
    /// Compare against the previous scene chunk when one is supplied to the encoder.
    pub verify_on_save: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            name_mismatch: MismatchPolicy::Warn,
            check_orthonormal: true,
            verify_on_save: true,
        }
    }
}

impl CodecConfig {
    /// Build a config from flag names:
    /// - `"no-check-orthonormal"` / `"no-verify-on-save"`: disable that check
    /// - `"strict-names"`: treat name mismatches as errors
    ///
    /// Unknown names are ignored.
    pub fn from_flags(flags: &[&str]) -> Self {
        let mut config = Self::default();
        config.apply_flags(flags);
        config
    }

    /// Layer flag names on top of an existing config.
    pub fn apply_flags(&mut self, flags: &[&str]) {
        for name in flags {
            match *name {
                "no-check-orthonormal" => self.check_orthonormal = false,
                "no-verify-on-save" => self.verify_on_save = false,
                "strict-names" => self.name_mismatch = MismatchPolicy::Error,
                _ => {}
            }
        }
    }
}
