//! Notification rule evaluation (`spec.md` §4.3 "Evaluation order (per
//! detection)").

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc};

use crate::config::{
    NotificationRule, NotificationScope, NotificationWhen, NotificationsConfig, TaxaFilter,
};
use crate::store::DetectionStore;
use crate::types::{Detection, SpeciesReference};

use super::template::{render, NotificationContext};

/// One rule that passed every gate, ready for its adapter.
pub struct Dispatch {
    pub rule_name: String,
    pub service: crate::config::NotificationService,
    pub target: String,
    pub title: String,
    pub body: String,
}

/// Holds the per-rule "last fired at" state the frequency gate needs.
/// Lives as long as the owning daemon process; frequency state is not
/// persisted across restarts (`spec.md` explicitly scopes "exactly-once
/// delivery across restarts" out).
#[derive(Default)]
pub struct RuleEngine {
    last_fired: HashMap<String, DateTime<Utc>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates every configured rule against one detection, returning
    /// the dispatches whose rule passed every gate. Mutates the
    /// frequency-gate bookkeeping for rules that fire.
    pub async fn evaluate(
        &mut self,
        config: &NotificationsConfig,
        detection: &Detection,
        taxonomy: Option<&SpeciesReference>,
        store: &DetectionStore<'_>,
        now: DateTime<Utc>,
    ) -> Vec<Dispatch> {
        if in_quiet_hours(config.notify_quiet_hours_start.as_deref(), config.notify_quiet_hours_end.as_deref(), now) {
            return Vec::new();
        }

        let ctx = NotificationContext::from_detection(detection);
        let mut dispatches = Vec::new();

        for rule in &config.notification_rules {
            if !rule.enabled {
                continue;
            }

            if !self.scope_allows(rule, detection, store, now).await {
                continue;
            }

            if !taxa_allows(rule, taxonomy) {
                continue;
            }

            let threshold = if rule.minimum_confidence == 0.0 {
                detection.species_confidence_threshold
            } else {
                rule.minimum_confidence
            };
            if detection.confidence < threshold {
                continue;
            }

            if !self.frequency_allows(rule, now) {
                continue;
            }

            let title_template = rule.title_template.as_deref().unwrap_or(&config.notification_title_default);
            let body_template = rule.body_template.as_deref().unwrap_or(&config.notification_body_default);

            dispatches.push(Dispatch {
                rule_name: rule.name.clone(),
                service: rule.service,
                target: rule.target.clone(),
                title: render(title_template, &ctx),
                body: render(body_template, &ctx),
            });

            self.last_fired.insert(rule.name.clone(), now);
        }

        dispatches
    }

    async fn scope_allows(
        &self,
        rule: &NotificationRule,
        detection: &Detection,
        store: &DetectionStore<'_>,
        now: DateTime<Utc>,
    ) -> bool {
        let since = match rule.scope {
            NotificationScope::All => return true,
            NotificationScope::NewEver => DateTime::<Utc>::MIN_UTC,
            NotificationScope::NewToday => start_of_day(now),
            NotificationScope::NewThisWeek => start_of_week(now),
        };

        match store
            .species_seen_in_range(&detection.scientific_name, since, detection.timestamp)
            .await
        {
            Ok(seen_before) => !seen_before,
            Err(e) => {
                tracing::warn!(error = %e, rule = %rule.name, "scope query failed, treating as not-new");
                false
            }
        }
    }

    fn frequency_allows(&self, rule: &NotificationRule, now: DateTime<Utc>) -> bool {
        let Some(when) = &rule.frequency.when else {
            return true;
        };
        let Some(last) = self.last_fired.get(&rule.name) else {
            return true;
        };

        match when {
            NotificationWhen::Always => true,
            NotificationWhen::OncePerDay => last.date_naive() != now.date_naive(),
            NotificationWhen::OncePerWeek => iso_week(last) != iso_week(&now),
        }
    }
}

fn iso_week(t: &DateTime<Utc>) -> (i32, u32) {
    let w = t.iso_week();
    (w.year(), w.week())
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight always exists")
        .and_utc()
}

fn start_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    let naive = now.date_naive();
    let days_since_monday = naive.weekday().num_days_from_monday();
    (naive - chrono::Duration::days(i64::from(days_since_monday)))
        .and_hms_opt(0, 0, 0)
        .expect("midnight always exists")
        .and_utc()
}

/// Whether `orders`/`families`/`genera`/`species` in `filter` include the
/// species described by `taxonomy` (or, for `species`, the bare scientific
/// name match works even without taxonomy available).
fn taxa_filter_matches(filter: &TaxaFilter, taxonomy: Option<&SpeciesReference>, scientific_name: &str) -> bool {
    if filter.species.iter().any(|s| s == scientific_name) {
        return true;
    }
    let Some(t) = taxonomy else { return false };
    filter.orders.iter().any(|o| o == &t.order)
        || filter.families.iter().any(|f| f == &t.family)
        || filter.genera.iter().any(|g| g == &t.genus)
}

fn taxa_allows(rule: &NotificationRule, taxonomy: Option<&SpeciesReference>) -> bool {
    let scientific_name = taxonomy.map(|t| t.scientific_name.as_str()).unwrap_or("");

    if !rule.include_taxa.is_empty() && !taxa_filter_matches(&rule.include_taxa, taxonomy, scientific_name) {
        return false;
    }
    if !rule.exclude_taxa.is_empty() && taxa_filter_matches(&rule.exclude_taxa, taxonomy, scientific_name) {
        return false;
    }
    true
}

/// `HH:MM`..`HH:MM` quiet-hours test, wrapping across midnight when
/// `start > end` (e.g. `22:00`..`06:00`).
fn in_quiet_hours(start: Option<&str>, end: Option<&str>, now: DateTime<Utc>) -> bool {
    let (Some(start), Some(end)) = (start, end) else {
        return false;
    };
    let (Some(start), Some(end)) = (parse_hhmm(start), parse_hhmm(end)) else {
        return false;
    };

    let current = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).expect("valid hour/minute from a DateTime");

    if start <= end {
        current >= start && current < end
    } else {
        current >= start || current < end
    }
}

fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    let (h, m) = s.split_once(':')?;
    NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, 0)
}
