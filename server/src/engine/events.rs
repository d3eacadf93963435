use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::company::{Company, CompanyId, GuildId};

/// One side of a resolved war, as it stood at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarSide {
    pub company_id: CompanyId,
    pub name: String,
    /// Influence earned during the war, before it was banked.
    pub influence: i64,
}

impl WarSide {
    pub fn of(company: &Company) -> Self {
        Self {
            company_id: company.id,
            name: company.name.clone(),
            influence: company.influence,
        }
    }
}

/// Notification emitted once per resolved war pair, for the messaging layer
/// to render and deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WarEvent {
    Victory {
        guild_id: GuildId,
        winner: WarSide,
        loser: WarSide,
        resolved_at: DateTime<Utc>,
    },
    Tie {
        guild_id: GuildId,
        first: WarSide,
        second: WarSide,
        resolved_at: DateTime<Utc>,
    },
}

impl WarEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            WarEvent::Victory { guild_id, .. } | WarEvent::Tie { guild_id, .. } => *guild_id,
        }
    }

    /// Both participants, winner first for a victory.
    pub fn sides(&self) -> (&WarSide, &WarSide) {
        match self {
            WarEvent::Victory { winner, loser, .. } => (winner, loser),
            WarEvent::Tie { first, second, .. } => (first, second),
        }
    }

    /// Plain-text headline.
    pub fn summary(&self) -> String {
        match self {
            WarEvent::Victory { winner, loser, .. } => {
                format!("{} defeats {}", winner.name, loser.name)
            }
            WarEvent::Tie { first, second, .. } => {
                format!(
                    "The war between {} and {} ended in a tie",
                    first.name, second.name
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(id: CompanyId, name: &str, influence: i64) -> WarSide {
        WarSide {
            company_id: id,
            name: name.into(),
            influence,
        }
    }

    #[test]
    fn test_victory_summary_and_json() {
        let event = WarEvent::Victory {
            guild_id: 7,
            winner: side(1, "A", 12),
            loser: side(2, "B", 7),
            resolved_at: Utc::now(),
        };
        assert_eq!(event.summary(), "A defeats B");
        assert_eq!(event.guild_id(), 7);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "victory");
        assert_eq!(json["winner"]["influence"], 12);

        let back: WarEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_tie_summary() {
        let event = WarEvent::Tie {
            guild_id: 7,
            first: side(1, "A", 3),
            second: side(2, "B", 3),
            resolved_at: Utc::now(),
        };
        assert_eq!(event.summary(), "The war between A and B ended in a tie");
        let (a, b) = event.sides();
        assert_eq!((a.company_id, b.company_id), (1, 2));
    }
}
