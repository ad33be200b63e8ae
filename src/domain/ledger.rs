use serde::{Deserialize, Serialize};

use super::{Coins, EntryType, TransactionEntry, WalletId, WalletStats};

/// Replay a wallet's entries (oldest first) and return the final balance.
pub fn replay_balance(entries: &[TransactionEntry]) -> Coins {
    entries.iter().map(|e| e.amount).sum()
}

/// Rebuild the gift counters for a wallet from its ledger history.
pub fn project_stats(wallet_id: WalletId, entries: &[TransactionEntry]) -> WalletStats {
    entries
        .iter()
        .filter(|e| e.wallet_id == wallet_id)
        .fold(WalletStats::empty(wallet_id), |mut stats, entry| {
            match entry.entry_type {
                EntryType::GiftSent => {
                    stats.gifts_sent += 1;
                    stats.coins_spent += -entry.amount;
                }
                EntryType::GiftReceived => {
                    stats.gifts_received += 1;
                    stats.coins_earned += entry.amount;
                }
                _ => {}
            }
            stats
        })
}

/// A problem found while replaying one wallet's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainIssue {
    /// `balance_before` does not equal the previous entry's `balance_after`
    BrokenLink {
        sequence: i64,
        expected_before: Coins,
        actual_before: Coins,
    },
    /// `balance_after != balance_before + amount`
    BadArithmetic { sequence: i64 },
    /// Sequence numbers are not 1, 2, 3, ...
    SequenceGap { expected: i64, actual: i64 },
    NegativeBalance { sequence: i64, balance: Coins },
    /// The wallet row disagrees with the last entry
    BalanceDrift { stored: Coins, replayed: Coins },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainReport {
    pub wallet_id: WalletId,
    pub entry_count: usize,
    pub replayed_balance: Coins,
    pub stored_balance: Coins,
    pub issues: Vec<ChainIssue>,
}

impl ChainReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Walk a wallet's entries in sequence order and check every link of the chain.
pub fn verify_chain(
    wallet_id: WalletId,
    stored_balance: Coins,
    entries: &[TransactionEntry],
) -> ChainReport {
    let mut issues = Vec::new();
    let mut previous_after: Coins = 0;

    for (i, entry) in entries.iter().enumerate() {
        let expected_sequence = i as i64 + 1;
        if entry.sequence != expected_sequence {
            issues.push(ChainIssue::SequenceGap {
                expected: expected_sequence,
                actual: entry.sequence,
            });
        }
        if entry.balance_before != previous_after {
            issues.push(ChainIssue::BrokenLink {
                sequence: entry.sequence,
                expected_before: previous_after,
                actual_before: entry.balance_before,
            });
        }
        if !entry.is_consistent() {
            issues.push(ChainIssue::BadArithmetic {
                sequence: entry.sequence,
            });
        }
        if entry.balance_after < 0 {
            issues.push(ChainIssue::NegativeBalance {
                sequence: entry.sequence,
                balance: entry.balance_after,
            });
        }
        previous_after = entry.balance_after;
    }

    let replayed = replay_balance(entries);
    if replayed != stored_balance {
        issues.push(ChainIssue::BalanceDrift {
            stored: stored_balance,
            replayed,
        });
    }

    ChainReport {
        wallet_id,
        entry_count: entries.len(),
        replayed_balance: replayed,
        stored_balance,
        issues,
    }
}

/// Ledger-wide integrity summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub wallet_count: usize,
    pub entry_count: usize,
    /// Sum of all wallet balances, platform wallet included
    pub total_coins: Coins,
    /// Sum of every entry amount; equals `total_coins` when nothing drifted
    pub net_issued: Coins,
    pub invalid_wallets: Vec<ChainReport>,
}

impl IntegrityReport {
    pub fn from_reports(reports: Vec<ChainReport>) -> Self {
        let wallet_count = reports.len();
        let entry_count = reports.iter().map(|r| r.entry_count).sum();
        let total_coins = reports.iter().map(|r| r.stored_balance).sum();
        let net_issued = reports.iter().map(|r| r.replayed_balance).sum();
        let invalid_wallets = reports.into_iter().filter(|r| !r.is_valid()).collect();
        Self {
            wallet_count,
            entry_count,
            total_coins,
            net_issued,
            invalid_wallets,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.invalid_wallets.is_empty() && self.total_coins == self.net_issued
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::NewEntry;

    fn chain(wallet: WalletId, amounts: &[(Coins, EntryType)]) -> Vec<TransactionEntry> {
        let mut balance = 0;
        amounts
            .iter()
            .enumerate()
            .map(|(i, (amount, entry_type))| {
                let entry = NewEntry::new(wallet, *amount, *entry_type, format!("ref-{}", i))
                    .into_entry(i as i64 + 1, balance);
                balance = entry.balance_after;
                entry
            })
            .collect()
    }

    #[test]
    fn test_replay_balance_empty() {
        assert_eq!(replay_balance(&[]), 0);
    }

    #[test]
    fn test_valid_chain() {
        let wallet = Uuid::new_v4();
        let entries = chain(
            wallet,
            &[
                (500, EntryType::Purchase),
                (-100, EntryType::GiftSent),
                (70, EntryType::GiftReceived),
            ],
        );
        let report = verify_chain(wallet, 470, &entries);
        assert!(report.is_valid(), "{:?}", report.issues);
        assert_eq!(report.replayed_balance, 470);
    }

    #[test]
    fn test_detects_broken_link() {
        let wallet = Uuid::new_v4();
        let mut entries = chain(wallet, &[(100, EntryType::Credit), (-50, EntryType::Debit)]);
        entries[1].balance_before = 80;
        entries[1].balance_after = 30;

        let report = verify_chain(wallet, 50, &entries);
        assert!(report.issues.contains(&ChainIssue::BrokenLink {
            sequence: 2,
            expected_before: 100,
            actual_before: 80,
        }));
    }

    #[test]
    fn test_detects_drift_and_gaps() {
        let wallet = Uuid::new_v4();
        let mut entries = chain(wallet, &[(100, EntryType::Credit), (10, EntryType::Credit)]);
        entries[1].sequence = 3;

        let report = verify_chain(wallet, 999, &entries);
        assert!(report.issues.contains(&ChainIssue::SequenceGap {
            expected: 2,
            actual: 3
        }));
        assert!(report.issues.contains(&ChainIssue::BalanceDrift {
            stored: 999,
            replayed: 110
        }));
    }

    #[test]
    fn test_project_stats_counts_gifts_only() {
        let wallet = Uuid::new_v4();
        let entries = chain(
            wallet,
            &[
                (1000, EntryType::Purchase),
                (-100, EntryType::GiftSent),
                (-250, EntryType::GiftSent),
                (35, EntryType::GiftReceived),
                (5, EntryType::AdminAdjustment),
            ],
        );
        let stats = project_stats(wallet, &entries);
        assert_eq!(stats.gifts_sent, 2);
        assert_eq!(stats.coins_spent, 350);
        assert_eq!(stats.gifts_received, 1);
        assert_eq!(stats.coins_earned, 35);
    }

    #[test]
    fn test_integrity_report_aggregates() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let good = verify_chain(a, 100, &chain(a, &[(100, EntryType::Credit)]));
        let bad = verify_chain(b, 5, &chain(b, &[(10, EntryType::Credit)]));

        let report = IntegrityReport::from_reports(vec![good, bad]);
        assert_eq!(report.wallet_count, 2);
        assert_eq!(report.entry_count, 2);
        assert_eq!(report.total_coins, 105);
        assert_eq!(report.net_issued, 110);
        assert_eq!(report.invalid_wallets.len(), 1);
        assert!(!report.is_healthy());
    }
}
