// =============================================================================
// Arbitrage Detector — sum mispricings and cross-venue spreads
// =============================================================================
//
// Single-venue: for a binary market, 1 - (ask_yes + ask_no) - fees is free
// money when positive; capital at risk is the sum paid for both contracts.
// Cross-venue: over matched pairs, buy the cheaper venue's ask and sell the
// richer venue's bid on equivalent-exposure outcomes (the pair's outcome map
// already accounts for polarity).
// =============================================================================

use std::collections::HashMap;

use tracing::{debug, info};

use crate::arbitrage::{ArbType, ArbitrageLeg, ArbitrageOpportunity};
use crate::clock::SharedClock;
use crate::types::{
    MarketKey, MarketPair, NormalizedMarket, OrderSide, Outcome, BPS_DIVISOR,
};
use crate::venue::VenueFees;

pub struct ArbitrageDetector {
    clock: SharedClock,
    min_spread_bps: f64,
    enable_single_platform: bool,
    enable_cross_platform: bool,
}

impl ArbitrageDetector {
    pub fn new(
        clock: SharedClock,
        min_spread_bps: f64,
        enable_single_platform: bool,
        enable_cross_platform: bool,
    ) -> Self {
        Self {
            clock,
            min_spread_bps,
            enable_single_platform,
            enable_cross_platform,
        }
    }

    /// Run both detectors over the current market snapshot.
    pub fn scan(
        &self,
        markets: &[NormalizedMarket],
        pairs: &[MarketPair],
        by_key: &HashMap<MarketKey, NormalizedMarket>,
    ) -> Vec<ArbitrageOpportunity> {
        let mut opportunities = Vec::new();
        if self.enable_single_platform {
            opportunities.extend(self.scan_single_platform(markets));
        }
        if self.enable_cross_platform {
            opportunities.extend(self.scan_cross_platform(pairs, by_key));
        }
        if !opportunities.is_empty() {
            info!(count = opportunities.len(), "arbitrage opportunities detected");
        }
        opportunities
    }

    // -------------------------------------------------------------------------
    // Single venue: probability-sum mispricing
    // -------------------------------------------------------------------------

    pub fn scan_single_platform(
        &self,
        markets: &[NormalizedMarket],
    ) -> Vec<ArbitrageOpportunity> {
        let now = self.clock.now_ms();
        let mut out = Vec::new();

        for market in markets {
            if !market.is_active || !market.is_binary() {
                continue;
            }
            let (Some(yes), Some(no)) = (market.yes(), market.no()) else {
                continue;
            };
            if yes.best_ask <= 0.0 || no.best_ask <= 0.0 {
                continue;
            }

            let fee_frac = VenueFees::for_platform(market.key.platform).taker_bps / BPS_DIVISOR;
            let cost = yes.best_ask + no.best_ask;
            let fees = cost * fee_frac;
            let profit_per_unit = 1.0 - cost - fees;
            if profit_per_unit <= 0.0 {
                continue;
            }

            // Capital at risk is what we pay for the pair.
            let spread_bps = profit_per_unit / cost * BPS_DIVISOR;
            if spread_bps < self.min_spread_bps {
                continue;
            }

            let max_size = yes.ask_size.min(no.ask_size);
            if max_size <= 0.0 {
                continue;
            }

            debug!(
                market = %market.key,
                cost,
                profit_per_unit,
                spread_bps,
                max_size,
                "sum mispricing found"
            );

            out.push(ArbitrageOpportunity::new(
                ArbType::SinglePlatform,
                [
                    buy_leg(&market.key, yes),
                    buy_leg(&market.key, no),
                ],
                spread_bps,
                profit_per_unit * max_size,
                max_size,
                (profit_per_unit / 0.05).clamp(0.0, 1.0),
                now,
            ));
        }
        out
    }

    // -------------------------------------------------------------------------
    // Cross venue: matched-pair spreads
    // -------------------------------------------------------------------------

    pub fn scan_cross_platform(
        &self,
        pairs: &[MarketPair],
        by_key: &HashMap<MarketKey, NormalizedMarket>,
    ) -> Vec<ArbitrageOpportunity> {
        let now = self.clock.now_ms();
        let mut out = Vec::new();

        for pair in pairs {
            let (Some(market_a), Some(market_b)) =
                (by_key.get(&pair.market_a), by_key.get(&pair.market_b))
            else {
                continue;
            };
            if !market_a.is_active || !market_b.is_active {
                continue;
            }

            for (a_id, b_id) in &pair.outcome_map {
                let Some(outcome_a) = find_outcome(market_a, a_id) else {
                    continue;
                };
                let Some(outcome_b) = find_outcome(market_b, b_id) else {
                    continue;
                };

                // Two directions: buy A / sell B, or buy B / sell A.
                for (buy_market, buy, sell_market, sell) in [
                    (market_a, outcome_a, market_b, outcome_b),
                    (market_b, outcome_b, market_a, outcome_a),
                ] {
                    if buy.best_ask <= 0.0 || sell.best_bid <= 0.0 {
                        continue;
                    }
                    let buy_fee =
                        VenueFees::for_platform(buy_market.key.platform).taker_bps / BPS_DIVISOR;
                    let sell_fee =
                        VenueFees::for_platform(sell_market.key.platform).taker_bps / BPS_DIVISOR;
                    let fees = buy.best_ask * buy_fee + sell.best_bid * sell_fee;
                    let profit_per_unit = sell.best_bid - buy.best_ask - fees;
                    if profit_per_unit <= 0.0 {
                        continue;
                    }
                    let spread_bps = profit_per_unit / buy.best_ask * BPS_DIVISOR;
                    if spread_bps < self.min_spread_bps {
                        continue;
                    }
                    let max_size = buy.ask_size.min(sell.bid_size);
                    if max_size <= 0.0 {
                        continue;
                    }

                    debug!(
                        buy_market = %buy_market.key,
                        sell_market = %sell_market.key,
                        profit_per_unit,
                        spread_bps,
                        max_size,
                        "cross-venue mispricing found"
                    );

                    out.push(ArbitrageOpportunity::new(
                        ArbType::CrossPlatform,
                        [
                            ArbitrageLeg {
                                platform: buy_market.key.platform,
                                market_id: buy_market.key.external_id.clone(),
                                outcome_id: buy.external_id.clone(),
                                side: OrderSide::Buy,
                                price: buy.best_ask,
                                size: max_size,
                            },
                            ArbitrageLeg {
                                platform: sell_market.key.platform,
                                market_id: sell_market.key.external_id.clone(),
                                outcome_id: sell.external_id.clone(),
                                side: OrderSide::Sell,
                                price: sell.best_bid,
                                size: max_size,
                            },
                        ],
                        spread_bps,
                        profit_per_unit * max_size,
                        max_size,
                        pair.confidence,
                        now,
                    ));
                }
            }
        }
        out
    }

    /// Drop expired entries from a batch.
    pub fn filter_live(
        &self,
        opportunities: Vec<ArbitrageOpportunity>,
    ) -> Vec<ArbitrageOpportunity> {
        let now = self.clock.now_ms();
        opportunities
            .into_iter()
            .filter(|o| !o.is_expired(now))
            .collect()
    }
}

fn buy_leg(key: &MarketKey, outcome: &Outcome) -> ArbitrageLeg {
    ArbitrageLeg {
        platform: key.platform,
        market_id: key.external_id.clone(),
        outcome_id: outcome.external_id.clone(),
        side: OrderSide::Buy,
        price: outcome.best_ask,
        size: outcome.ask_size,
    }
}

fn find_outcome<'a>(market: &'a NormalizedMarket, outcome_id: &str) -> Option<&'a Outcome> {
    market.outcomes.iter().find(|o| o.external_id == outcome_id)
}
