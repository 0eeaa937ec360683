use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(ProcessingStatus {
    Pending => "pending",
    Processing => "processing",
    AiProcessing => "ai_processing",
    Completed => "completed",
    Failed => "failed",
});

str_enum!(VirusScanStatus {
    ScanPending => "scan_pending",
    ScanClean => "scan_clean",
    ScanInfected => "scan_infected",
    ScanError => "scan_error",
});

str_enum!(VersionEvent {
    Update => "update",
    Restore => "restore",
});

str_enum!(ContentKind {
    Pdf => "pdf",
    Word => "word",
    PlainText => "plain_text",
    Image => "image",
    Spreadsheet => "spreadsheet",
    Other => "other",
});

impl ContentKind {
    /// Whether this content kind goes through AI classification after
    /// extraction. Spreadsheets and unknown formats are extracted only.
    pub fn ai_eligible(&self) -> bool {
        matches!(
            self,
            Self::Pdf | Self::Word | Self::PlainText | Self::Image
        )
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Processing,
            ProcessingStatus::AiProcessing,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
        ] {
            assert_eq!(ProcessingStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_value_is_rejected() {
        let err = VirusScanStatus::from_str("quarantined").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn ai_eligibility_allow_list() {
        assert!(ContentKind::Pdf.ai_eligible());
        assert!(ContentKind::Word.ai_eligible());
        assert!(ContentKind::PlainText.ai_eligible());
        assert!(ContentKind::Image.ai_eligible());
        assert!(!ContentKind::Spreadsheet.ai_eligible());
        assert!(!ContentKind::Other.ai_eligible());
    }
}
