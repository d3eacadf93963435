use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::company::{Company, CompanyId, GuildId, Member, MemberId, MemberRole, Visibility};

/// A stored company row, without its roster.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CompanyRow {
    pub id: i64,
    pub guild_id: i64,
    pub name: String,
    pub visibility: String,
    pub influence: i64,
    pub total_influence: i64,
    pub at_war: bool,
    pub war_expires_at: Option<DateTime<Utc>>,
    pub opponent_id: Option<i64>,
    pub created_at: String,
}

/// A stored roster entry.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberRow {
    pub id: i64,
    pub member_id: i64,
    pub guild_id: i64,
    pub company_id: i64,
    pub role: String,
    pub joined_at: String,
}

/// A pending invitation to join a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invite {
    pub code: String,
    pub guild_id: GuildId,
    pub company_id: CompanyId,
    pub member_id: MemberId,
    pub invited_by: MemberId,
    pub created_at: DateTime<Utc>,
}

fn decode_error(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}

impl MemberRow {
    pub fn into_member(self) -> Result<Member, sqlx::Error> {
        let role = MemberRole::parse(&self.role)
            .ok_or_else(|| decode_error(format!("unknown member role '{}'", self.role)))?;
        Ok(Member::new(self.member_id, self.company_id, role))
    }
}

impl CompanyRow {
    /// Attach the roster rows that belong to this company.
    pub fn into_company(self, members: Vec<MemberRow>) -> Result<Company, sqlx::Error> {
        let visibility = Visibility::parse(&self.visibility)
            .ok_or_else(|| decode_error(format!("unknown visibility '{}'", self.visibility)))?;
        let members = members
            .into_iter()
            .map(MemberRow::into_member)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Company {
            id: self.id,
            guild_id: self.guild_id,
            name: self.name,
            visibility,
            influence: self.influence,
            total_influence: self.total_influence,
            at_war: self.at_war,
            war_expires_at: self.war_expires_at,
            opponent_id: self.opponent_id,
            members,
        })
    }
}
