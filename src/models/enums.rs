use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form doubles as the serde representation.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
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

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(EntryState {
    Queued => "QUEUED",
    Processing => "PROCESSING",
    Done => "DONE",
    Error => "ERROR",
    Duplicate => "DUPLICATE",
    Quarantined => "QUARANTINED",
});

str_enum!(RecordStatus {
    Done => "DONE",
    Duplicate => "DUPLICATE",
});

str_enum!(TotalWeightMode {
    Declared => "declared",
    SumRows => "sum_rows",
});

impl EntryState {
    /// Terminal states are never left by the pipeline itself.
    /// QUARANTINED can still be re-queued by an explicit manual retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Duplicate | Self::Quarantined)
    }

    /// Queue state machine.
    pub fn can_transition_to(&self, next: EntryState) -> bool {
        use EntryState::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Processing, Done)
                | (Processing, Duplicate)
                | (Processing, Error)
                | (Processing, Quarantined)
                | (Processing, Queued)
                | (Error, Queued)
                | (Error, Quarantined)
                | (Quarantined, Queued)
        )
    }
}

impl Default for TotalWeightMode {
    fn default() -> Self {
        Self::Declared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn entry_state_round_trips_through_str() {
        for state in [
            EntryState::Queued,
            EntryState::Processing,
            EntryState::Done,
            EntryState::Error,
            EntryState::Duplicate,
            EntryState::Quarantined,
        ] {
            assert_eq!(EntryState::from_str(state.as_str()).unwrap(), state);
        }
    }

    #[test]
    fn unknown_state_is_rejected() {
        let err = EntryState::from_str("READY").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&EntryState::Quarantined).unwrap();
        assert_eq!(json, "\"QUARANTINED\"");
        let mode: TotalWeightMode = serde_json::from_str("\"sum_rows\"").unwrap();
        assert_eq!(mode, TotalWeightMode::SumRows);
    }

    #[test]
    fn terminal_states() {
        assert!(EntryState::Done.is_terminal());
        assert!(EntryState::Duplicate.is_terminal());
        assert!(EntryState::Quarantined.is_terminal());
        assert!(!EntryState::Error.is_terminal());
        assert!(!EntryState::Queued.is_terminal());
        assert!(!EntryState::Processing.is_terminal());
    }

    #[test]
    fn done_cannot_be_reopened() {
        assert!(!EntryState::Done.can_transition_to(EntryState::Queued));
        assert!(!EntryState::Duplicate.can_transition_to(EntryState::Processing));
        assert!(!EntryState::Queued.can_transition_to(EntryState::Done));
    }

    #[test]
    fn retry_path_is_allowed() {
        assert!(EntryState::Processing.can_transition_to(EntryState::Error));
        assert!(EntryState::Error.can_transition_to(EntryState::Queued));
        assert!(EntryState::Error.can_transition_to(EntryState::Quarantined));
        assert!(EntryState::Quarantined.can_transition_to(EntryState::Queued));
    }
}
