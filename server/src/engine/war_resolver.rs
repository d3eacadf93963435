use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::company::{Company, CompanyId, GuildId, WarState};
use super::directory::CompanyDirectory;
use super::error::{CompanyError, Result};
use super::events::{WarEvent, WarSide};

/// Default time between resolution passes.
pub const DEFAULT_RESOLVE_INTERVAL: Duration = Duration::from_secs(30);

/// Strictly higher influence wins. Equal influence is a tie, reported with
/// the lower company id first so the outcome does not depend on pair order.
pub fn calculate_winner<'a>(a: &'a Company, b: &'a Company) -> Result<(&'a Company, &'a Company)> {
    if a.influence > b.influence {
        Ok((a, b))
    } else if b.influence > a.influence {
        Ok((b, a))
    } else {
        Err(CompanyError::Tie {
            first: a.id.min(b.id),
            second: a.id.max(b.id),
        })
    }
}

/// Notification for a pair, computed before either side banks its influence.
fn resolution_event(guild_id: GuildId, a: &Company, b: &Company, now: DateTime<Utc>) -> WarEvent {
    match calculate_winner(a, b) {
        Ok((winner, loser)) => WarEvent::Victory {
            guild_id,
            winner: WarSide::of(winner),
            loser: WarSide::of(loser),
            resolved_at: now,
        },
        Err(_) => {
            let (first, second) = if a.id < b.id { (a, b) } else { (b, a) };
            WarEvent::Tie {
                guild_id,
                first: WarSide::of(first),
                second: WarSide::of(second),
                resolved_at: now,
            }
        }
    }
}

/// What settling one listed war did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Both sides banked their influence; the notification to send.
    Resolved(WarEvent),
    /// The opponent is gone and the survivor banked alone.
    Orphaned,
    /// Nothing was left to settle.
    AlreadySettled,
}

/// What one pass over every guild did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    /// Pairs settled and announced.
    pub resolved: usize,
    /// Companies settled alone because their opponent is gone.
    pub orphaned: usize,
    /// Wars left running because they have not expired yet.
    pub deferred: usize,
    /// Guilds or pairs that failed; retried next pass.
    pub failed: usize,
}

/// Periodic task that ends wars and announces the outcome.
///
/// It only goes through the directory's public API. A pair is written in one
/// transaction before its notification is sent; if the write fails nothing is
/// sent and the pair is picked up again on the next pass.
pub struct WarResolver {
    directory: Arc<CompanyDirectory>,
    events: mpsc::Sender<WarEvent>,
    period: Duration,
    require_expiry: bool,
}

impl WarResolver {
    pub fn new(directory: Arc<CompanyDirectory>, events: mpsc::Sender<WarEvent>) -> Self {
        Self {
            directory,
            events,
            period: DEFAULT_RESOLVE_INTERVAL,
            require_expiry: false,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Leave wars running until their `war_expires_at` has passed.
    pub fn with_require_expiry(mut self, require_expiry: bool) -> Self {
        self.require_expiry = require_expiry;
        self
    }

    /// Run passes on a fixed period until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            period_secs = self.period.as_secs_f64(),
            require_expiry = self.require_expiry,
            "war resolver started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("war resolver shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let summary = self.tick(Utc::now()).await;
                    if summary != TickSummary::default() {
                        debug!(?summary, "war resolution pass");
                    }
                }
            }
        }
    }

    /// One pass over every cached guild.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickSummary {
        let mut summary = TickSummary::default();

        for guild_id in self.directory.guild_ids() {
            let at_war = match self.directory.list_at_war(guild_id).await {
                Ok(list) => list,
                Err(e) => {
                    warn!(guild_id, error = %e, "could not list wars");
                    summary.failed += 1;
                    continue;
                }
            };

            for company in at_war {
                let outcome = match company.war_state() {
                    WarState::AtWar { expires_at, .. }
                        if self.require_expiry && expires_at.is_some_and(|at| at > now) =>
                    {
                        summary.deferred += 1;
                        continue;
                    }
                    WarState::AtWar { opponent_id, .. } => {
                        self.settle(guild_id, company.id, opponent_id, now).await
                    }
                    // Flagged at war, but the opponent row was deleted under it
                    WarState::AtPeace => self.settle_alone(guild_id, company.id, None).await,
                };
                match outcome {
                    Ok(Settlement::Resolved(event)) => {
                        summary.resolved += 1;
                        self.announce(event).await;
                    }
                    Ok(Settlement::Orphaned) => summary.orphaned += 1,
                    Ok(Settlement::AlreadySettled) => {}
                    Err(e) if e.is_transient() => {
                        warn!(guild_id, company_id = company.id, error = %e, "war resolution deferred");
                        summary.failed += 1;
                    }
                    Err(e) => {
                        error!(guild_id, company_id = company.id, error = %e, "war resolution failed");
                        summary.failed += 1;
                    }
                }
            }
        }

        summary
    }

    /// End the war between `a` and `b`.
    pub async fn settle(
        &self,
        guild_id: GuildId,
        a: CompanyId,
        b: CompanyId,
        now: DateTime<Utc>,
    ) -> Result<Settlement> {
        let settled = self
            .directory
            .update_pair_with(guild_id, a, b, |first, second| {
                if !(first.is_fighting(second.id) && second.is_fighting(first.id)) {
                    return Ok(None);
                }
                let event = resolution_event(guild_id, first, second, now);
                first.end_war();
                second.end_war();
                Ok(Some(event))
            })
            .await;

        match settled {
            Ok((_, _, Some(event))) => Ok(Settlement::Resolved(event)),
            Ok((_, _, None)) => Ok(Settlement::AlreadySettled),
            // One row is gone: bank what the survivor earned, if `a` survived.
            Err(CompanyError::NotFound(_)) => self.settle_alone(guild_id, a, Some(b)).await,
            Err(e) => Err(e),
        }
    }

    /// End the war of a company whose opponent no longer exists. `opponent_id`
    /// is the opponent it is expected to still name, if any.
    async fn settle_alone(
        &self,
        guild_id: GuildId,
        company_id: CompanyId,
        opponent_id: Option<CompanyId>,
    ) -> Result<Settlement> {
        let result = self
            .directory
            .update_with(guild_id, company_id, |company| {
                if !company.at_war || company.opponent_id != opponent_id {
                    return Ok(false);
                }
                company.end_war();
                Ok(true)
            })
            .await;

        match result {
            Ok((_, true)) => {
                info!(guild_id, company_id, "war ended without an opponent");
                Ok(Settlement::Orphaned)
            }
            Ok((_, false)) | Err(CompanyError::NotFound(_)) => Ok(Settlement::AlreadySettled),
            Err(e) => Err(e),
        }
    }

    async fn announce(&self, event: WarEvent) {
        info!(guild_id = event.guild_id(), summary = %event.summary(), "war resolved");
        if self.events.send(event).await.is_err() {
            warn!("war notification channel closed");
        }
    }
}
