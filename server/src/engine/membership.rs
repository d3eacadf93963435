//! Membership rules, checked against a guild's companies before any roster
//! change reaches the store. The directory evaluates these inside the guild's
//! exclusive section, so a check and the write it guards cannot interleave
//! with another mutation of the same guild.

use super::company::{Company, MemberId, MemberRole, Visibility};
use super::error::{CompanyError, Result};
use crate::db::models::Invite;

/// What removing a member will do to the company.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Others remain on the roster.
    Member,
    /// The roster becomes empty and the company is disbanded.
    LastMember,
}

/// Find the company `member_id` belongs to among `companies`.
pub fn company_of<'a>(
    companies: impl IntoIterator<Item = &'a Company>,
    member_id: MemberId,
) -> Option<&'a Company> {
    companies.into_iter().find(|c| c.has_member(member_id))
}

/// A member may belong to one company per guild.
pub fn check_unaffiliated<'a>(
    companies: impl IntoIterator<Item = &'a Company>,
    member_id: MemberId,
) -> Result<()> {
    match company_of(companies, member_id) {
        Some(current) => Err(CompanyError::AlreadyMember {
            member_id,
            company: current.name.clone(),
        }),
        None => Ok(()),
    }
}

/// A new company starts with exactly one member, its leader, and that member
/// must not already serve elsewhere.
pub fn check_founding<'a>(
    companies: impl IntoIterator<Item = &'a Company>,
    company: &Company,
) -> Result<()> {
    let [founder] = company.members.as_slice() else {
        return Err(CompanyError::InvalidInput(
            "A company is founded with exactly one member".into(),
        ));
    };
    if !founder.is_leader() || founder.company_id != company.id {
        return Err(CompanyError::InvalidInput(
            "The founding member must lead the new company".into(),
        ));
    }
    if company.influence != 0 || company.total_influence != 0 || company.at_war {
        return Err(CompanyError::InvalidInput(
            "A new company starts at peace with no influence".into(),
        ));
    }
    check_unaffiliated(companies, founder.member_id)
}

/// Join rules: not already affiliated, and private companies need an invite
/// addressed to this member for this company.
pub fn check_join<'a>(
    companies: impl IntoIterator<Item = &'a Company>,
    target: &Company,
    member_id: MemberId,
    invite: Option<&Invite>,
) -> Result<()> {
    check_unaffiliated(companies, member_id)?;

    if target.visibility == Visibility::Private {
        let invited = invite
            .is_some_and(|i| i.company_id == target.id && i.member_id == member_id);
        if !invited {
            return Err(CompanyError::PrivateCompany(target.name.clone()));
        }
    }
    Ok(())
}

/// Direct roster insertion: single affiliation and a single leader.
pub fn check_admit<'a>(
    companies: impl IntoIterator<Item = &'a Company>,
    target: &Company,
    member_id: MemberId,
    role: MemberRole,
) -> Result<()> {
    check_unaffiliated(companies, member_id)?;
    if role == MemberRole::Leader && target.leader().is_some() {
        return Err(CompanyError::InvalidInput(format!(
            "`{}` already has a leader",
            target.name
        )));
    }
    Ok(())
}

/// The inviter must serve in `company`; the invitee must be free.
pub fn check_invite<'a>(
    companies: impl IntoIterator<Item = &'a Company>,
    company: &Company,
    inviter_id: MemberId,
    invitee_id: MemberId,
) -> Result<()> {
    if !company.has_member(inviter_id) {
        return Err(CompanyError::NotFound(format!(
            "member {inviter_id} in `{}`",
            company.name
        )));
    }
    check_unaffiliated(companies, invitee_id)
}

/// A leader can only leave once nobody else is left to lead.
pub fn check_removal(company: &Company, member_id: MemberId) -> Result<Removal> {
    let Some(member) = company.member(member_id) else {
        return Err(CompanyError::NotFound(format!(
            "member {member_id} in `{}`",
            company.name
        )));
    };
    if company.members.len() == 1 {
        return Ok(Removal::LastMember);
    }
    if member.is_leader() {
        return Err(CompanyError::LeadershipRequired(company.name.clone()));
    }
    Ok(Removal::Member)
}

/// Leadership moves from the current leader to another roster member.
pub fn check_resignation(
    company: &Company,
    leader_id: MemberId,
    successor_id: MemberId,
) -> Result<()> {
    if !company.is_leader(leader_id) {
        return Err(CompanyError::NotLeader(leader_id));
    }
    if successor_id == leader_id || !company.has_member(successor_id) {
        return Err(CompanyError::SuccessorNotMember(successor_id));
    }
    Ok(())
}

/// Roster shape after a completed mutation: one leader, no duplicates.
pub fn check_roster(company: &Company) -> Result<()> {
    let leaders = company.members.iter().filter(|m| m.is_leader()).count();
    if leaders != 1 {
        return Err(CompanyError::InvalidInput(format!(
            "`{}` has {leaders} leaders",
            company.name
        )));
    }
    let mut ids: Vec<MemberId> = company.members.iter().map(|m| m.member_id).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.len() != company.members.len() {
        return Err(CompanyError::InvalidInput(format!(
            "`{}` lists a member twice",
            company.name
        )));
    }
    Ok(())
}
