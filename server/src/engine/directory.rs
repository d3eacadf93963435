use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::company::{Company, CompanyId, GuildId, Member, MemberId, MemberRole, WarState};
use super::error::{CompanyError, Result};
use super::influence::{self, Activity};
use super::membership::{self, Removal};
use crate::db::models::Invite;
use crate::db::repository::{MemberRemoval, Repository};

/// Default bound on a single store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// One guild's cached companies. `filled` means the map holds the guild's
/// complete set; before that it may hold individually loaded entries.
#[derive(Debug, Default)]
struct GuildPartition {
    companies: HashMap<CompanyId, Company>,
    filled: bool,
}

impl GuildPartition {
    fn sorted(&self) -> Vec<Company> {
        let mut list: Vec<Company> = self.companies.values().cloned().collect();
        list.sort_by_key(|c| c.id);
        list
    }

    fn find_by_name(&self, name: &str) -> Option<&Company> {
        let wanted = name.to_lowercase();
        self.companies
            .values()
            .find(|c| c.name.to_lowercase() == wanted)
    }

    fn require(&self, company_id: CompanyId) -> Result<&Company> {
        self.companies
            .get(&company_id)
            .ok_or_else(|| CompanyError::NotFound(format!("company {company_id}")))
    }

    fn company_of(&self, member_id: MemberId) -> Option<&Company> {
        membership::company_of(self.companies.values(), member_id)
    }

    fn apply_removal(&mut self, company_id: CompanyId, outcome: &MemberRemoval) {
        match outcome {
            MemberRemoval::Remaining(company) => {
                self.companies.insert(company.id, company.clone());
            }
            MemberRemoval::Disbanded { released } => {
                self.companies.remove(&company_id);
                for company in released {
                    self.companies.insert(company.id, company.clone());
                }
            }
        }
    }
}

/// Cache facade over the company store, partitioned by guild.
///
/// Every operation holds its guild's lock from the first read to the last
/// cache write, store round trip included. The store stays the authority:
/// the cache is only written after the store call succeeded, and with the
/// value the store returned. Returned companies are detached clones.
pub struct CompanyDirectory {
    repo: Arc<dyn Repository>,
    guilds: DashMap<GuildId, Arc<Mutex<GuildPartition>>>,
    store_timeout: Duration,
}

impl CompanyDirectory {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self::with_store_timeout(repo, DEFAULT_STORE_TIMEOUT)
    }

    pub fn with_store_timeout(repo: Arc<dyn Repository>, store_timeout: Duration) -> Self {
        Self {
            repo,
            guilds: DashMap::new(),
            store_timeout,
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn lock(&self, guild_id: GuildId) -> OwnedMutexGuard<GuildPartition> {
        // Clone the slot out so no shard guard lives across the await.
        let slot = Arc::clone(&self.guilds.entry(guild_id).or_default());
        slot.lock_owned().await
    }

    /// Give back a read's lock. An empty partition is dropped from the map
    /// unless another task already holds its slot, so lookups of unknown
    /// guilds leave nothing behind.
    fn release(&self, guild_id: GuildId, part: OwnedMutexGuard<GuildPartition>) {
        if !part.companies.is_empty() {
            return;
        }
        let slot = Arc::clone(OwnedMutexGuard::mutex(&part));
        drop(part);
        // Slots are only cloned under the shard lock, which `remove_if` holds.
        self.guilds
            .remove_if(&guild_id, |_, s| Arc::ptr_eq(s, &slot) && Arc::strong_count(s) == 2);
    }

    /// Run one store call under the configured timeout.
    async fn store<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, sqlx::Error>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(CompanyError::from),
            Err(_) => Err(CompanyError::StoreUnavailable(format!(
                "store call exceeded {} ms",
                self.store_timeout.as_millis()
            ))),
        }
    }

    /// Run one cache-affecting write. A failed round trip may still have
    /// committed (a late acknowledgement), so the partition goes back to cold
    /// and the next operation refills it from the store.
    async fn write<T>(
        &self,
        guild_id: GuildId,
        part: &mut GuildPartition,
        call: impl Future<Output = std::result::Result<T, sqlx::Error>>,
    ) -> Result<T> {
        let result = self.store(call).await;
        if let Err(e) = &result
            && e.is_transient()
        {
            part.companies.clear();
            part.filled = false;
            warn!(guild_id, error = %e, "store write unconfirmed, guild cache dropped");
        }
        result
    }

    async fn fill(&self, guild_id: GuildId, part: &mut GuildPartition) -> Result<()> {
        if part.filled {
            return Ok(());
        }
        let companies = self.store(self.repo.fetch_companies_by_guild(guild_id)).await?;
        debug!(guild_id, count = companies.len(), "guild partition filled");
        part.companies = companies.into_iter().map(|c| (c.id, c)).collect();
        part.filled = true;
        Ok(())
    }

    async fn persist(
        &self,
        guild_id: GuildId,
        part: &mut GuildPartition,
        changed: &[Company],
    ) -> Result<Vec<Company>> {
        let stored = self
            .write(guild_id, part, self.repo.merge_company_fields(changed))
            .await?;
        for company in &stored {
            part.companies.insert(company.id, company.clone());
        }
        Ok(stored)
    }

    async fn pair_locked<R>(
        &self,
        guild_id: GuildId,
        part: &mut GuildPartition,
        a: CompanyId,
        b: CompanyId,
        f: impl FnOnce(&mut Company, &mut Company) -> Result<R>,
    ) -> Result<(Company, Company, R)> {
        if a == b {
            return Err(CompanyError::InvalidInput(
                "a company cannot be paired with itself".into(),
            ));
        }
        let before_a = part.require(a)?.clone();
        let before_b = part.require(b)?.clone();

        let mut first = before_a.clone();
        let mut second = before_b.clone();
        let output = f(&mut first, &mut second)?;
        if first == before_a && second == before_b {
            return Ok((first, second, output));
        }

        check_war_fields(&before_a, &first)?;
        check_war_fields(&before_b, &second)?;
        check_links(&part.companies, &[&first, &second])?;

        let mut stored = self
            .persist(guild_id, part, &[first, second])
            .await?
            .into_iter();
        match (stored.next(), stored.next()) {
            (Some(first), Some(second)) => Ok((first, second, output)),
            _ => Err(CompanyError::NotFound(format!("company {a} or {b}"))),
        }
    }

    async fn remove_locked(
        &self,
        guild_id: GuildId,
        part: &mut GuildPartition,
        company_id: CompanyId,
        member_id: MemberId,
    ) -> Result<MemberRemoval> {
        let removal = membership::check_removal(part.require(company_id)?, member_id)?;

        let outcome = self
            .write(guild_id, part, self.repo.delete_member(company_id, member_id))
            .await?;
        part.apply_removal(company_id, &outcome);
        match (removal, &outcome) {
            (Removal::LastMember, MemberRemoval::Disbanded { released }) => {
                info!(guild_id, company_id, released = released.len(), "company disbanded");
            }
            (Removal::Member, MemberRemoval::Remaining(_)) => {}
            _ => warn!(guild_id, company_id, member_id, ?removal, "store roster differed from cache"),
        }
        Ok(outcome)
    }

    async fn admit_locked(
        &self,
        guild_id: GuildId,
        part: &mut GuildPartition,
        member: &Member,
        invite_code: Option<&str>,
    ) -> Result<Company> {
        let company = self
            .write(guild_id, part, self.repo.insert_member(member, invite_code))
            .await?;
        report_roster(&company);
        part.companies.insert(company.id, company.clone());
        Ok(company)
    }

    async fn invite_for(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
        code: &str,
    ) -> Result<Invite> {
        match self.store(self.repo.fetch_invite(code)).await? {
            Some(invite) if invite.guild_id == guild_id && invite.member_id == member_id => Ok(invite),
            _ => Err(CompanyError::NotFound(format!("invite `{code}`"))),
        }
    }

    // ── Startup ─────────────────────────────────────────────────────

    /// Load every guild's companies in one pass. Run once before serving.
    pub async fn warm_cache(&self) -> Result<usize> {
        let companies = self.store(self.repo.fetch_all_companies()).await?;
        let total = companies.len();

        let mut by_guild: HashMap<GuildId, HashMap<CompanyId, Company>> = HashMap::new();
        for company in companies {
            by_guild
                .entry(company.guild_id)
                .or_default()
                .insert(company.id, company);
        }

        let guild_count = by_guild.len();
        for (guild_id, companies) in by_guild {
            let mut part = self.lock(guild_id).await;
            part.companies = companies;
            part.filled = true;
        }

        info!(companies = total, guilds = guild_count, "company cache warmed");
        Ok(total)
    }

    /// Guilds that currently have a cache partition, in id order.
    pub fn guild_ids(&self) -> Vec<GuildId> {
        let mut ids: Vec<GuildId> = self.guilds.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub async fn get_company(&self, guild_id: GuildId, company_id: CompanyId) -> Result<Option<Company>> {
        let mut part = self.lock(guild_id).await;
        let found = self.company_locked(guild_id, &mut part, company_id).await;
        self.release(guild_id, part);
        found
    }

    async fn company_locked(
        &self,
        guild_id: GuildId,
        part: &mut GuildPartition,
        company_id: CompanyId,
    ) -> Result<Option<Company>> {
        if let Some(company) = part.companies.get(&company_id) {
            return Ok(Some(company.clone()));
        }
        if part.filled {
            return Ok(None);
        }

        let fetched = self.store(self.repo.fetch_company_by_id(company_id)).await?;
        match fetched {
            Some(company) if company.guild_id == guild_id => {
                part.companies.insert(company.id, company.clone());
                Ok(Some(company))
            }
            _ => Ok(None),
        }
    }

    /// Case-insensitive lookup by full company name.
    pub async fn get_company_by_name(&self, guild_id: GuildId, name: &str) -> Result<Option<Company>> {
        let mut part = self.lock(guild_id).await;
        let found = self
            .fill(guild_id, &mut part)
            .await
            .map(|()| part.find_by_name(name).cloned());
        self.release(guild_id, part);
        found
    }

    pub async fn get_member_company(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
    ) -> Result<Option<Company>> {
        let mut part = self.lock(guild_id).await;
        let found = self.member_company_locked(guild_id, &mut part, member_id).await;
        self.release(guild_id, part);
        found
    }

    async fn member_company_locked(
        &self,
        guild_id: GuildId,
        part: &mut GuildPartition,
        member_id: MemberId,
    ) -> Result<Option<Company>> {
        if let Some(company) = part.company_of(member_id) {
            return Ok(Some(company.clone()));
        }
        if part.filled {
            return Ok(None);
        }

        let fetched = self
            .store(self.repo.fetch_company_by_member(guild_id, member_id))
            .await?;
        if let Some(company) = &fetched {
            part.companies.insert(company.id, company.clone());
        }
        Ok(fetched)
    }

    pub async fn list_guild_companies(&self, guild_id: GuildId) -> Result<Vec<Company>> {
        let mut part = self.lock(guild_id).await;
        let listed = self.fill(guild_id, &mut part).await.map(|()| part.sorted());
        self.release(guild_id, part);
        listed
    }

    /// Companies at war, one per pair: the side with the lower id. A company
    /// whose opponent no longer exists is listed on its own.
    pub async fn list_at_war(&self, guild_id: GuildId) -> Result<Vec<Company>> {
        let mut part = self.lock(guild_id).await;
        if let Err(e) = self.fill(guild_id, &mut part).await {
            self.release(guild_id, part);
            return Err(e);
        }

        let mut seen = HashSet::new();
        let mut at_war = Vec::new();
        for company in part.sorted() {
            // The flag alone still lists a company whose opponent row is gone.
            if !company.at_war || seen.contains(&company.id) {
                continue;
            }
            seen.insert(company.id);
            if let WarState::AtWar { opponent_id, .. } = company.war_state() {
                seen.insert(opponent_id);
            }
            at_war.push(company);
        }
        self.release(guild_id, part);
        Ok(at_war)
    }

    // ── Writes ──────────────────────────────────────────────────────

    /// Persist a new company, then cache it.
    pub async fn add_company(&self, guild_id: GuildId, company: Company) -> Result<Company> {
        if company.guild_id != guild_id {
            return Err(CompanyError::InvalidInput(format!(
                "company {} belongs to guild {}",
                company.id, company.guild_id
            )));
        }

        let mut part = self.lock(guild_id).await;
        self.fill(guild_id, &mut part).await?;

        if let Some(existing) = part.find_by_name(&company.name) {
            return Err(CompanyError::DuplicateName(existing.name.clone()));
        }
        if part.companies.contains_key(&company.id) {
            return Err(CompanyError::InvalidInput(format!(
                "company {} already exists",
                company.id
            )));
        }
        membership::check_founding(part.companies.values(), &company)?;

        self.write(guild_id, &mut part, self.repo.insert_company(&company))
            .await?;
        part.companies.insert(company.id, company.clone());
        info!(guild_id, company_id = company.id, name = %company.name, "company created");
        Ok(company)
    }

    /// Write the score and war fields of a cached company through to the
    /// store. The roster and name are not touched.
    pub async fn update_company(&self, guild_id: GuildId, company: Company) -> Result<Company> {
        let mut part = self.lock(guild_id).await;
        let Some(before) = part.companies.get(&company.id).cloned() else {
            self.release(guild_id, part);
            return Err(CompanyError::NotFound(format!("company {} in cache", company.id)));
        };
        if company.guild_id != guild_id {
            return Err(CompanyError::NotFound(format!("company {} in guild {guild_id}", company.id)));
        }
        self.fill(guild_id, &mut part).await?;

        check_war_fields(&before, &company)?;
        check_links(&part.companies, &[&company])?;
        let mut stored = self.persist(guild_id, &mut part, &[company]).await?;
        stored
            .pop()
            .ok_or_else(|| CompanyError::NotFound(format!("company {}", before.id)))
    }

    /// Read-modify-write of one company under the guild lock.
    pub async fn update_with<R>(
        &self,
        guild_id: GuildId,
        company_id: CompanyId,
        f: impl FnOnce(&mut Company) -> Result<R>,
    ) -> Result<(Company, R)> {
        let mut part = self.lock(guild_id).await;
        self.fill(guild_id, &mut part).await?;

        let before = part.require(company_id)?.clone();
        let mut company = before.clone();
        let output = f(&mut company)?;
        if company == before {
            return Ok((company, output));
        }

        check_war_fields(&before, &company)?;
        check_links(&part.companies, &[&company])?;
        let mut stored = self.persist(guild_id, &mut part, &[company]).await?;
        let company = stored
            .pop()
            .ok_or_else(|| CompanyError::NotFound(format!("company {company_id}")))?;
        Ok((company, output))
    }

    /// Read-modify-write of two companies under the guild lock. Both rows are
    /// written in one transaction, so the pair is never half-updated.
    pub async fn update_pair_with<R>(
        &self,
        guild_id: GuildId,
        a: CompanyId,
        b: CompanyId,
        f: impl FnOnce(&mut Company, &mut Company) -> Result<R>,
    ) -> Result<(Company, Company, R)> {
        let mut part = self.lock(guild_id).await;
        self.fill(guild_id, &mut part).await?;
        self.pair_locked(guild_id, &mut part, a, b, f).await
    }

    /// Add a roster entry directly, bypassing invitations.
    pub async fn add_member(&self, guild_id: GuildId, member: Member) -> Result<Company> {
        let mut part = self.lock(guild_id).await;
        self.fill(guild_id, &mut part).await?;

        let target = part.require(member.company_id)?;
        membership::check_admit(part.companies.values(), target, member.member_id, member.role)?;
        self.admit_locked(guild_id, &mut part, &member, None).await
    }

    /// Remove a roster entry. The last member out disbands the company.
    pub async fn remove_member(
        &self,
        guild_id: GuildId,
        company_id: CompanyId,
        member_id: MemberId,
    ) -> Result<MemberRemoval> {
        let mut part = self.lock(guild_id).await;
        self.fill(guild_id, &mut part).await?;
        self.remove_locked(guild_id, &mut part, company_id, member_id).await
    }

    /// Join a company as a private. Private companies need `invite_code`.
    pub async fn join_company(
        &self,
        guild_id: GuildId,
        member_id: MemberId,
        company_id: CompanyId,
        invite_code: Option<&str>,
    ) -> Result<Company> {
        let mut part = self.lock(guild_id).await;
        self.fill(guild_id, &mut part).await?;

        let invite = match invite_code {
            Some(code) => self
                .store(self.repo.fetch_invite(code))
                .await?
                .filter(|i| i.guild_id == guild_id),
            None => None,
        };
        let target = part.require(company_id)?;
        membership::check_join(part.companies.values(), target, member_id, invite.as_ref())?;

        // Only an invite for this company is consumed.
        let code = invite
            .as_ref()
            .filter(|i| i.company_id == company_id && i.member_id == member_id)
            .map(|i| i.code.as_str());
        let member = Member::new(member_id, company_id, MemberRole::Private);
        let company = self.admit_locked(guild_id, &mut part, &member, code).await?;
        info!(guild_id, company_id, member_id, "member joined company");
        Ok(company)
    }

    pub async fn leave_company(&self, guild_id: GuildId, member_id: MemberId) -> Result<MemberRemoval> {
        let mut part = self.lock(guild_id).await;
        self.fill(guild_id, &mut part).await?;

        let company_id = part
            .company_of(member_id)
            .map(|c| c.id)
            .ok_or_else(|| CompanyError::NotFound(format!("company of member {member_id}")))?;
        let outcome = self
            .remove_locked(guild_id, &mut part, company_id, member_id)
            .await?;
        info!(guild_id, company_id, member_id, "member left company");
        Ok(outcome)
    }

    /// Issue an invitation from `inviter_id`'s company to `invitee_id`.
    pub async fn invite_member(
        &self,
        guild_id: GuildId,
        inviter_id: MemberId,
        invitee_id: MemberId,
    ) -> Result<Invite> {
        let mut part = self.lock(guild_id).await;
        self.fill(guild_id, &mut part).await?;

        let company = part
            .company_of(inviter_id)
            .ok_or_else(|| CompanyError::NotFound(format!("company of member {inviter_id}")))?;
        membership::check_invite(part.companies.values(), company, inviter_id, invitee_id)?;

        let invite = Invite {
            code: Uuid::new_v4().simple().to_string(),
            guild_id,
            company_id: company.id,
            member_id: invitee_id,
            invited_by: inviter_id,
            created_at: Utc::now(),
        };
        self.store(self.repo.insert_invite(&invite)).await?;
        debug!(guild_id, company_id = invite.company_id, invitee_id, "invite issued");
        Ok(invite)
    }

    pub async fn accept_invite(&self, guild_id: GuildId, member_id: MemberId, code: &str) -> Result<Company> {
        let mut part = self.lock(guild_id).await;
        self.fill(guild_id, &mut part).await?;

        let invite = self.invite_for(guild_id, member_id, code).await?;
        let target = part.require(invite.company_id)?;
        membership::check_join(part.companies.values(), target, member_id, Some(&invite))?;

        let member = Member::new(member_id, invite.company_id, MemberRole::Private);
        let company = self
            .admit_locked(guild_id, &mut part, &member, Some(code))
            .await?;
        info!(guild_id, company_id = company.id, member_id, "invite accepted");
        Ok(company)
    }

    pub async fn decline_invite(&self, guild_id: GuildId, member_id: MemberId, code: &str) -> Result<()> {
        let _part = self.lock(guild_id).await;
        self.invite_for(guild_id, member_id, code).await?;
        self.store(self.repo.delete_invite(code)).await?;
        Ok(())
    }

    /// Hand leadership of `leader_id`'s company to `successor_id`.
    pub async fn resign_leadership(
        &self,
        guild_id: GuildId,
        leader_id: MemberId,
        successor_id: MemberId,
    ) -> Result<Company> {
        let mut part = self.lock(guild_id).await;
        self.fill(guild_id, &mut part).await?;

        let company = part
            .company_of(leader_id)
            .ok_or_else(|| CompanyError::NotFound(format!("company of member {leader_id}")))?;
        membership::check_resignation(company, leader_id, successor_id)?;
        let company_id = company.id;

        let company = self
            .write(guild_id, &mut part, self.repo.swap_leader(company_id, leader_id, successor_id))
            .await?;
        report_roster(&company);
        part.companies.insert(company.id, company.clone());
        info!(guild_id, company_id, leader_id, successor_id, "leadership transferred");
        Ok(company)
    }

    /// Start a war between the declaring leader's company and `target_id`.
    pub async fn declare_war(
        &self,
        guild_id: GuildId,
        declarer_id: MemberId,
        target_id: CompanyId,
        duration: chrono::Duration,
    ) -> Result<(Company, Company)> {
        if duration <= chrono::Duration::zero() {
            return Err(CompanyError::InvalidInput("war duration must be positive".into()));
        }
        let expires_at = Utc::now()
            .checked_add_signed(duration)
            .ok_or_else(|| CompanyError::InvalidInput("war duration is too long".into()))?;

        let mut part = self.lock(guild_id).await;
        self.fill(guild_id, &mut part).await?;

        let own = part
            .company_of(declarer_id)
            .ok_or_else(|| CompanyError::NotFound(format!("company of member {declarer_id}")))?;
        if !own.is_leader(declarer_id) {
            return Err(CompanyError::NotLeader(declarer_id));
        }
        if own.id == target_id {
            return Err(CompanyError::InvalidInput(
                "a company cannot declare war on itself".into(),
            ));
        }
        let own_id = own.id;

        let (attacker, defender, ()) = self
            .pair_locked(guild_id, &mut part, own_id, target_id, |attacker, defender| {
                for side in [&*attacker, &*defender] {
                    if side.at_war {
                        return Err(CompanyError::AlreadyAtWar(side.name.clone()));
                    }
                }
                attacker.begin_war(defender.id, expires_at);
                defender.begin_war(attacker.id, expires_at);
                Ok(())
            })
            .await?;

        info!(
            guild_id,
            attacker = attacker.id,
            defender = defender.id,
            %expires_at,
            "war declared"
        );
        Ok((attacker, defender))
    }

    /// Credit influence for an activity to its author's company, if that
    /// company is at war. Returns the updated company when anything changed.
    pub async fn record_activity(
        &self,
        guild_id: GuildId,
        author_id: MemberId,
        activity: &Activity,
    ) -> Result<Option<Company>> {
        let earned = influence::score(activity);
        if earned == 0 {
            return Ok(None);
        }

        let mut part = self.lock(guild_id).await;
        self.fill(guild_id, &mut part).await?;

        let Some(company) = part.company_of(author_id) else {
            return Ok(None);
        };
        if !company.at_war {
            return Ok(None);
        }
        let mut company = company.clone();
        company.influence += i64::from(earned);

        let mut stored = self.persist(guild_id, &mut part, &[company]).await?;
        Ok(stored.pop())
    }

    /// Delete every company of a guild. Returns what was removed so the
    /// caller can clean up platform roles.
    pub async fn clear_guild(&self, guild_id: GuildId) -> Result<Vec<Company>> {
        let mut part = self.lock(guild_id).await;
        self.fill(guild_id, &mut part).await?;

        let deleted = self
            .write(guild_id, &mut part, self.repo.delete_guild_companies(guild_id))
            .await?;
        let cleared = part.sorted();
        part.companies.clear();
        info!(guild_id, deleted, "guild companies cleared");
        Ok(cleared)
    }
}

/// The store's indexes keep rosters well formed; surface it loudly if not.
fn report_roster(company: &Company) {
    if let Err(e) = membership::check_roster(company) {
        warn!(company_id = company.id, error = %e, "stored roster is malformed");
    }
}

/// Field-level rules for a single company update.
fn check_war_fields(before: &Company, after: &Company) -> Result<()> {
    if after.id != before.id || after.guild_id != before.guild_id {
        return Err(CompanyError::InvalidInput("company identity cannot change".into()));
    }
    if after.influence < 0 {
        return Err(CompanyError::InvalidInput(format!(
            "`{}` cannot have negative influence",
            after.name
        )));
    }
    if after.total_influence < before.total_influence {
        return Err(CompanyError::InvalidInput(format!(
            "total influence of `{}` cannot decrease",
            after.name
        )));
    }
    if after.at_war != after.opponent_id.is_some() || after.opponent_id == Some(after.id) {
        return Err(CompanyError::InvalidInput(format!(
            "`{}` has an inconsistent war state",
            after.name
        )));
    }
    Ok(())
}

/// Entry for `id` once `changed` replaces the cached entries.
fn lookup<'a>(
    cached: &'a HashMap<CompanyId, Company>,
    changed: &[&'a Company],
    id: CompanyId,
) -> Option<&'a Company> {
    changed
        .iter()
        .copied()
        .find(|c| c.id == id)
        .or_else(|| cached.get(&id))
}

/// War links stay mutual once `changed` replaces the cached entries.
fn check_links(cached: &HashMap<CompanyId, Company>, changed: &[&Company]) -> Result<()> {
    let broken =
        |name: &str| CompanyError::InvalidInput(format!("war links of `{name}` must be mutual"));

    for company in changed {
        if let Some(opponent) = company.opponent_id {
            match lookup(cached, changed, opponent) {
                Some(o) if o.opponent_id == Some(company.id) => {}
                _ => return Err(broken(&company.name)),
            }
        }
    }
    // Nobody left outside the change may still point at a changed company
    // that no longer points back.
    for other in cached.values() {
        if changed.iter().any(|c| c.id == other.id) {
            continue;
        }
        let Some(target) = other.opponent_id else {
            continue;
        };
        if let Some(target) = changed.iter().find(|c| c.id == target) {
            if target.opponent_id != Some(other.id) {
                return Err(broken(&target.name));
            }
        }
    }
    Ok(())
}
