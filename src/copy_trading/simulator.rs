// =============================================================================
// Copy Simulator — replay a wallet's history through the sizing pipeline
// =============================================================================
//
// Answers "what would mirroring this wallet have done to our book" without
// touching a venue: every historical activity runs through the same sizing
// rules as live copying, buys and sells flow through a FIFO position book,
// and whatever is still open marks against the last seen price.
// =============================================================================

use std::collections::HashMap;

use serde::Serialize;
use tracing::info;

use crate::config::TraderCopyConfig;
use crate::copy_trading::positions::CopyPositionBook;
use crate::copy_trading::sizing::{calculate_size, SizingCalculation};
use crate::types::OrderSide;
use crate::venue::WalletActivity;

/// Outcome of one replay.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub wallet: String,
    pub trades_copied: usize,
    pub trades_skipped: usize,
    pub total_invested_usd: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub final_balance: f64,
    pub open_positions: usize,
}

pub struct CopySimulator {
    starting_balance: f64,
}

impl CopySimulator {
    pub fn new(starting_balance: f64) -> Self {
        Self { starting_balance }
    }

    /// Replay `history` (oldest first) under `config`.
    pub fn replay(
        &self,
        config: &TraderCopyConfig,
        history: &[WalletActivity],
    ) -> SimulationResult {
        let book = CopyPositionBook::new();
        let mut balance = self.starting_balance;
        let mut copied = 0usize;
        let mut skipped = 0usize;
        let mut invested = 0.0;
        let mut last_price: HashMap<(String, String), f64> = HashMap::new();
        let mut tick: u64 = 0;

        for activity in history {
            if activity.price <= 0.0 || activity.size <= 0.0 {
                skipped += 1;
                continue;
            }
            tick += 1;
            last_price.insert(
                (activity.market_id.clone(), activity.outcome_id.clone()),
                activity.price,
            );

            match activity.side {
                OrderSide::Buy => {
                    match calculate_size(config, activity.usd_value, balance) {
                        SizingCalculation::Copy { size_usd } => {
                            let contracts = size_usd / activity.price;
                            book.record_buy(
                                &activity.wallet,
                                &activity.market_id,
                                &activity.outcome_id,
                                activity.price,
                                contracts,
                                tick,
                            );
                            balance -= size_usd;
                            invested += size_usd;
                            copied += 1;
                        }
                        SizingCalculation::Skip { .. } => skipped += 1,
                    }
                }
                OrderSide::Sell => {
                    // Mirror the trader's proportional exit: sell the same
                    // fraction of our lot as they sold of their ticket.
                    match book.position(
                        &activity.wallet,
                        &activity.market_id,
                        &activity.outcome_id,
                    ) {
                        Some(position) if position.size > 0.0 => {
                            let sell_size = position.size.min(activity.size);
                            if let Some((_, _, realized)) = book.record_sell(
                                &activity.wallet,
                                &activity.market_id,
                                &activity.outcome_id,
                                activity.price,
                                sell_size,
                            ) {
                                balance += sell_size * activity.price;
                                let _ = realized; // accumulated in the book
                                copied += 1;
                            }
                        }
                        _ => skipped += 1,
                    }
                }
            }
        }

        // Mark whatever is still open against the last seen prices.
        let mut unrealized = 0.0;
        let open = book.open_positions();
        for position in &open {
            let mark = last_price
                .get(&(position.market_id.clone(), position.outcome_id.clone()))
                .copied()
                .unwrap_or(position.avg_entry_price);
            unrealized += (mark - position.avg_entry_price) * position.size;
        }
        let realized = book.total_realized_pnl();

        let result = SimulationResult {
            wallet: config.wallet.clone(),
            trades_copied: copied,
            trades_skipped: skipped,
            total_invested_usd: invested,
            realized_pnl: realized,
            unrealized_pnl: unrealized,
            final_balance: balance,
            open_positions: open.len(),
        };
        info!(
            wallet = %result.wallet,
            copied = result.trades_copied,
            skipped = result.trades_skipped,
            realized = result.realized_pnl,
            unrealized = result.unrealized_pnl,
            "copy simulation complete"
        );
        result
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AggregationConfig, SizingMode};
    use chrono::Utc;

    fn config() -> TraderCopyConfig {
        TraderCopyConfig {
            wallet: "0xwhale".into(),
            sizing: SizingMode::Fixed,
            copy_percentage: 5.0,
            fixed_copy_amount: 50.0,
            min_trade_size: 5.0,
            max_position_size: 400.0,
            aggregation: AggregationConfig::default(),
        }
    }

    fn activity(side: OrderSide, price: f64, size: f64) -> WalletActivity {
        WalletActivity {
            transaction_hash: format!("0x{price}-{size}-{side}"),
            wallet: "0xwhale".into(),
            market_id: "m1".into(),
            outcome_id: "y".into(),
            side,
            price,
            size,
            usd_value: price * size,
            at: Utc::now(),
        }
    }

    #[test]
    fn profitable_round_trip_realizes_gains() {
        let simulator = CopySimulator::new(1_000.0);
        // Fixed 50 USD at 0.50 => 100 contracts; trader later sells at 0.60.
        let history = vec![
            activity(OrderSide::Buy, 0.50, 1_000.0),
            activity(OrderSide::Sell, 0.60, 1_000.0),
        ];
        let result = simulator.replay(&config(), &history);
        assert_eq!(result.trades_copied, 2);
        assert_eq!(result.open_positions, 0);
        // 100 contracts * 0.10 = 10.
        assert!((result.realized_pnl - 10.0).abs() < 1e-9);
        assert!((result.final_balance - 1_010.0).abs() < 1e-9);
        assert_eq!(result.unrealized_pnl, 0.0);
    }

    #[test]
    fn open_position_marks_to_last_price() {
        let simulator = CopySimulator::new(1_000.0);
        let history = vec![
            activity(OrderSide::Buy, 0.50, 1_000.0),
            // Another print moves the mark without touching our lot.
            activity(OrderSide::Buy, 0.58, 200.0),
        ];
        let result = simulator.replay(&config(), &history);
        assert_eq!(result.open_positions, 1);
        assert!(result.unrealized_pnl > 0.0);
        assert_eq!(result.realized_pnl, 0.0);
    }

    #[test]
    fn sells_without_position_are_skipped() {
        let simulator = CopySimulator::new(1_000.0);
        let history = vec![activity(OrderSide::Sell, 0.60, 500.0)];
        let result = simulator.replay(&config(), &history);
        assert_eq!(result.trades_copied, 0);
        assert_eq!(result.trades_skipped, 1);
    }

    #[test]
    fn balance_exhaustion_skips_further_buys() {
        let simulator = CopySimulator::new(60.0);
        let history = vec![
            activity(OrderSide::Buy, 0.50, 1_000.0), // takes 50
            activity(OrderSide::Buy, 0.40, 1_000.0), // only 10 left
            activity(OrderSide::Buy, 0.40, 1_000.0), // nothing left
        ];
        let result = simulator.replay(&config(), &history);
        // Second buy shrinks to the remaining balance, third is skipped.
        assert_eq!(result.trades_copied, 2);
        assert_eq!(result.trades_skipped, 1);
        assert!(result.final_balance.abs() < 1e-9);
    }
}
