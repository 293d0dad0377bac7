//! Picks the user to notify about a page.

use std::sync::Arc;

use tracing::{debug, instrument, trace};

use imagesuggest_core::{
    defaults, NotificationChannel, NotificationLog, OptInCache, Page, Result, RunConfig,
    RunState, User, UserId, UserOptionsLookup, UserRepository, WatcherQuery,
};

/// Selects at most one eligible, opted-in, under-quota user per page.
#[derive(Clone)]
pub struct UserSelector {
    log: Arc<dyn NotificationLog>,
    users: Arc<dyn UserRepository>,
    options: Arc<dyn UserOptionsLookup>,
    event_type: String,
    candidate_limit: i64,
}

impl UserSelector {
    pub fn new(
        log: Arc<dyn NotificationLog>,
        users: Arc<dyn UserRepository>,
        options: Arc<dyn UserOptionsLookup>,
    ) -> Self {
        Self {
            log,
            users,
            options,
            event_type: defaults::EVENT_NAME.to_string(),
            candidate_limit: defaults::CANDIDATE_USER_LIMIT,
        }
    }

    /// Select a user for the page, caching opt-in decisions in the run state.
    pub async fn select_user(&self, page: &Page, state: &mut RunState) -> Result<Option<User>> {
        let at_quota = state.users_at_quota();
        self.select_with_cache(page, &state.config, &at_quota, &mut state.opted_in_user_ids)
            .await
    }

    /// Select a user for the page against an explicit opt-in cache.
    ///
    /// Excludes users already notified about this page, users in `at_quota`,
    /// and users the cache knows to be opted out. Candidates are the page's
    /// watchers, or the named users of a category run, tried most recent
    /// editor first; the first opted-in one wins.
    #[instrument(
        skip(self, page, config, at_quota, cache),
        fields(subsystem = "jobs", component = "user_selector", op = "select_user", page_id = page.id)
    )]
    pub async fn select_with_cache<C: OptInCache + ?Sized>(
        &self,
        page: &Page,
        config: &RunConfig,
        at_quota: &[UserId],
        cache: &mut C,
    ) -> Result<Option<User>> {
        let mut exclude = self
            .log
            .notified_users_for_page(&self.event_type, page.id)
            .await?;
        exclude.extend_from_slice(at_quota);
        exclude.extend(cache.opted_out());
        exclude.sort_unstable();
        exclude.dedup();

        let candidates = match &config.category {
            Some(target) => {
                let available: Vec<UserId> = target
                    .user_ids
                    .iter()
                    .copied()
                    .filter(|id| exclude.binary_search(id).is_err())
                    .collect();
                if available.is_empty() {
                    return Ok(None);
                }
                self.users
                    .by_recent_edit(page, &available, self.candidate_limit)
                    .await?
            }
            None => {
                self.users
                    .watchers(WatcherQuery {
                        page,
                        min_edit_count: config.min_edit_count,
                        exclude_user_ids: &exclude,
                        limit: self.candidate_limit,
                    })
                    .await?
            }
        };
        debug!(
            candidate_count = candidates.len(),
            excluded = exclude.len(),
            "Evaluating candidate users"
        );

        for user in candidates {
            match cache.get(user.id) {
                Some(true) => {
                    trace!(user_id = user.id, "Opt-in cached");
                    return Ok(Some(user));
                }
                Some(false) => continue,
                None => {}
            }

            let opted_in = self.has_opted_in(&user).await?;
            cache.insert(user.id, opted_in);
            trace!(user_id = user.id, opted_in, "Opt-in resolved");
            if opted_in {
                return Ok(Some(user));
            }
        }

        Ok(None)
    }

    /// Whether any notification channel is enabled for the event.
    async fn has_opted_in(&self, user: &User) -> Result<bool> {
        for channel in NotificationChannel::ALL {
            let option = channel.option_name(&self.event_type);
            if self.options.is_enabled(user, &option).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
