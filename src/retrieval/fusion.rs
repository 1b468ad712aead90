//! Reciprocal rank fusion and recency re-scoring.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::store::types::RankedDoc;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Exponential age decay blended into a fused score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecencyParams {
    /// Age at which the decay term halves. Non-positive disables decay.
    pub half_life_days: f64,
    /// Share of the score that recency can remove, in `[0, 1]`.
    pub weight: f64,
}

impl Default for RecencyParams {
    fn default() -> Self {
        Self {
            half_life_days: 30.0,
            weight: 0.15,
        }
    }
}

impl RecencyParams {
    /// Multiplier for a document of the given age: `(1 - w) + w · 0.5^(age / half_life)`,
    /// so with the defaults it ranges over `[0.85, 1.0]`.
    pub fn factor(&self, age_seconds: f64) -> f64 {
        let weight = self.weight.clamp(0.0, 1.0);
        let half_life = self.half_life_days * SECONDS_PER_DAY;
        let decay = if half_life > 0.0 {
            0.5f64.powf(age_seconds.max(0.0) / half_life)
        } else {
            1.0
        };
        1.0 - weight * (1.0 - decay)
    }
}

/// Merge two rankings by summing `1 / (k_const + rank + 1)` per chunk id.
///
/// Ranks are 0-based positions in each input. Chunks present in only one list
/// keep that list's contribution. Output is best first, truncated to `top_k`;
/// equal fused scores keep first-seen order (dense list first).
pub fn reciprocal_rank_fusion(
    dense: &[RankedDoc],
    sparse: &[RankedDoc],
    k_const: usize,
    top_k: usize,
) -> Vec<RankedDoc> {
    let mut fused: Vec<RankedDoc> = Vec::with_capacity(dense.len() + sparse.len());
    let mut slots: HashMap<i64, usize> = HashMap::new();

    for list in [dense, sparse] {
        for (rank, doc) in list.iter().enumerate() {
            let contribution = 1.0 / (k_const as f64 + rank as f64 + 1.0);
            let slot = *slots.entry(doc.id).or_insert_with(|| {
                fused.push(RankedDoc {
                    score: 0.0,
                    ..doc.clone()
                });
                fused.len() - 1
            });
            fused[slot].score += contribution;
        }
    }

    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused.truncate(top_k);
    fused
}

/// Rescale each score by [`RecencyParams::factor`] of the document's age and
/// re-sort.
///
/// The age comes from the first ten characters of `date` (`YYYY-MM-DD`, taken
/// as UTC midnight). Unparseable dates count as age zero so a formatting
/// problem never costs a result its rank.
pub fn recency_boost(
    docs: Vec<RankedDoc>,
    now: DateTime<Utc>,
    params: &RecencyParams,
) -> Vec<RankedDoc> {
    let mut boosted: Vec<RankedDoc> = docs
        .into_iter()
        .map(|mut doc| {
            let age_seconds = parse_day(&doc.date)
                .map(|then| (now - then).num_milliseconds() as f64 / 1000.0)
                .unwrap_or(0.0)
                .max(0.0);
            doc.score *= params.factor(age_seconds);
            doc
        })
        .collect();

    boosted.sort_by(|a, b| b.score.total_cmp(&a.score));
    boosted
}

fn parse_day(date: &str) -> Option<DateTime<Utc>> {
    let prefix = match date.char_indices().nth(10) {
        Some((end, _)) => &date[..end],
        None => date,
    };
    let day = NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()?;
    Some(day.and_hms_opt(0, 0, 0)?.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn doc(id: i64, date: &str, score: f64) -> RankedDoc {
        RankedDoc {
            id,
            text: format!("doc {id}"),
            date: date.into(),
            score,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 24, 0, 0, 0).unwrap()
    }

    #[test]
    fn rrf_sums_contributions_for_shared_ids() {
        let dense = vec![doc(1, "", 0.9), doc(2, "", 0.5)];
        let sparse = vec![doc(2, "", 1.0), doc(3, "", 1.0)];
        let fused = reciprocal_rank_fusion(&dense, &sparse, 60, 10);

        let score = |id: i64| fused.iter().find(|d| d.id == id).unwrap().score;
        assert!((score(1) - 1.0 / 61.0).abs() < 1e-12);
        assert!((score(2) - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert!((score(3) - 1.0 / 62.0).abs() < 1e-12);
        assert_eq!(fused[0].id, 2);
    }

    #[test]
    fn rrf_first_in_both_beats_first_in_one() {
        let dense = vec![doc(1, "", 0.0), doc(2, "", 0.0)];
        let sparse = vec![doc(1, "", 0.0), doc(3, "", 0.0)];
        let fused = reciprocal_rank_fusion(&dense, &sparse, 60, 10);
        assert_eq!(fused[0].id, 1);
        assert!(fused.iter().skip(1).all(|d| d.score <= fused[0].score));
    }

    #[test]
    fn rrf_truncates_and_keeps_text() {
        let dense = vec![doc(1, "2025-01-01", 0.0), doc(2, "", 0.0), doc(3, "", 0.0)];
        let fused = reciprocal_rank_fusion(&dense, &[], 60, 2);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].text, "doc 1");
        assert_eq!(fused[0].date, "2025-01-01");
    }

    #[test]
    fn rrf_ignores_input_scores() {
        let dense = vec![doc(1, "", -5.0), doc(2, "", 100.0)];
        let fused = reciprocal_rank_fusion(&dense, &[], 60, 10);
        assert_eq!(fused[0].id, 1);
    }

    #[test]
    fn newer_doc_scores_at_least_as_high() {
        let docs = vec![doc(1, "2024-01-01", 1.0), doc(2, "2025-09-20", 1.0)];
        let boosted = recency_boost(docs, now(), &RecencyParams::default());
        assert_eq!(boosted[0].id, 2);
        assert!(boosted[0].score >= boosted[1].score);
    }

    #[test]
    fn boost_is_bounded_by_weight() {
        let docs = vec![doc(1, "1990-01-01", 1.0), doc(2, "2025-09-24", 1.0)];
        let boosted = recency_boost(docs, now(), &RecencyParams::default());
        for d in &boosted {
            assert!(d.score >= 0.85 - 1e-12 && d.score <= 1.0 + 1e-12);
        }
        let today = boosted.iter().find(|d| d.id == 2).unwrap();
        assert!((today.score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn one_half_life_gives_midpoint() {
        let docs = vec![doc(1, "2025-08-25T10:00:00Z", 1.0)];
        let boosted = recency_boost(docs, now(), &RecencyParams::default());
        assert!((boosted[0].score - (0.85 + 0.15 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn unparseable_date_has_no_penalty() {
        let docs = vec![doc(1, "last tuesday", 0.5), doc(2, "", 0.4)];
        let boosted = recency_boost(docs, now(), &RecencyParams::default());
        assert_eq!(boosted[0].score, 0.5);
        assert_eq!(boosted[1].score, 0.4);
    }

    #[test]
    fn future_dates_are_not_rewarded() {
        let docs = vec![doc(1, "2030-01-01", 1.0)];
        let boosted = recency_boost(docs, now(), &RecencyParams::default());
        assert_eq!(boosted[0].score, 1.0);
    }

    #[test]
    fn recency_can_reorder_close_scores() {
        let docs = vec![doc(1, "2023-01-01", 0.0330), doc(2, "2025-09-23", 0.0320)];
        let boosted = recency_boost(docs, now(), &RecencyParams::default());
        assert_eq!(boosted[0].id, 2);
    }

    #[test]
    fn zero_weight_disables_recency() {
        let params = RecencyParams {
            half_life_days: 30.0,
            weight: 0.0,
        };
        let docs = vec![doc(1, "2000-01-01", 0.7)];
        assert_eq!(recency_boost(docs, now(), &params)[0].score, 0.7);
    }
}
