use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the guild (platform server) that owns a company.
pub type GuildId = i64;

/// Stable company identifier. Doubles as the platform role ID.
pub type CompanyId = i64;

/// Identifier of an external participant.
pub type MemberId = i64;

/// Whether anyone can join, or only invited members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "Public",
            Visibility::Private => "Private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Public" => Some(Visibility::Public),
            "Private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

/// A member's rank within their company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberRole {
    Leader,
    Private,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Leader => "Leader",
            MemberRole::Private => "Private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Leader" => Some(MemberRole::Leader),
            "Private" => Some(MemberRole::Private),
            _ => None,
        }
    }
}

/// A roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: MemberId,
    pub company_id: CompanyId,
    pub role: MemberRole,
}

impl Member {
    pub fn new(member_id: MemberId, company_id: CompanyId, role: MemberRole) -> Self {
        Self {
            member_id,
            company_id,
            role,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.role == MemberRole::Leader
    }
}

/// War status of a single company.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarState {
    AtPeace,
    AtWar {
        opponent_id: CompanyId,
        expires_at: Option<DateTime<Utc>>,
    },
}

/// A guild-scoped company with its roster and scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub guild_id: GuildId,
    pub name: String,
    pub visibility: Visibility,
    /// Running score for the current war.
    pub influence: i64,
    /// Lifetime score, only grown by war resolution.
    pub total_influence: i64,
    pub at_war: bool,
    pub war_expires_at: Option<DateTime<Utc>>,
    pub opponent_id: Option<CompanyId>,
    pub members: Vec<Member>,
}

impl Company {
    /// A fresh company at peace with its founder as leader.
    pub fn new(
        id: CompanyId,
        guild_id: GuildId,
        name: impl Into<String>,
        visibility: Visibility,
        founder: MemberId,
    ) -> Self {
        Self {
            id,
            guild_id,
            name: name.into(),
            visibility,
            influence: 0,
            total_influence: 0,
            at_war: false,
            war_expires_at: None,
            opponent_id: None,
            members: vec![Member::new(founder, id, MemberRole::Leader)],
        }
    }

    pub fn leader(&self) -> Option<&Member> {
        self.members.iter().find(|m| m.is_leader())
    }

    pub fn member(&self, member_id: MemberId) -> Option<&Member> {
        self.members.iter().find(|m| m.member_id == member_id)
    }

    pub fn has_member(&self, member_id: MemberId) -> bool {
        self.member(member_id).is_some()
    }

    pub fn is_leader(&self, member_id: MemberId) -> bool {
        self.member(member_id).is_some_and(Member::is_leader)
    }

    pub fn war_state(&self) -> WarState {
        match (self.at_war, self.opponent_id) {
            (true, Some(opponent_id)) => WarState::AtWar {
                opponent_id,
                expires_at: self.war_expires_at,
            },
            _ => WarState::AtPeace,
        }
    }

    /// Whether this company is currently at war with `other`.
    pub fn is_fighting(&self, other: CompanyId) -> bool {
        matches!(self.war_state(), WarState::AtWar { opponent_id, .. } if opponent_id == other)
    }

    pub(crate) fn begin_war(&mut self, opponent_id: CompanyId, expires_at: DateTime<Utc>) {
        self.at_war = true;
        self.opponent_id = Some(opponent_id);
        self.war_expires_at = Some(expires_at);
    }

    /// Bank the running influence and return to peace.
    pub(crate) fn end_war(&mut self) {
        self.total_influence += self.influence;
        self.influence = 0;
        self.at_war = false;
        self.war_expires_at = None;
        self.opponent_id = None;
    }
}
