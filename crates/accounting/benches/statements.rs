use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::{Duration, NaiveDate, Utc};
use stockledger_accounting::chart::{
    AccountDef, ACCOUNTS_RECEIVABLE, CASH, COST_OF_GOODS_SOLD, INVENTORY, OPERATING_EXPENSES,
    SALES_REVENUE,
};
use stockledger_accounting::statements::{balance_sheet, cash_flow, profit_and_loss, sales_summary};
use stockledger_accounting::{CashFlowCategory, EntrySource, JournalEntryLine, JournalEntryPosted, LedgerId};
use stockledger_core::{AggregateId, Money, TenantId};

fn line(def: AccountDef, cents: i64, is_debit: bool) -> JournalEntryLine {
    JournalEntryLine {
        account: def.account(),
        amount: Money::from_cents(cents),
        is_debit,
    }
}

/// A year of books: each entry is a sale with its cost, or an expense.
fn books(count: usize) -> Vec<JournalEntryPosted> {
    let tenant_id = TenantId::new();
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
    (0..count)
        .map(|i| {
            let on = start + Duration::days((i % 365) as i64);
            let amount = 1_000 + (i as i64 % 97) * 10;
            let (source, lines) = match i % 3 {
                0 => (
                    EntrySource::Sale { sale_id: AggregateId::new() },
                    vec![
                        line(CASH, amount / 2, true),
                        line(ACCOUNTS_RECEIVABLE, amount - amount / 2, true),
                        line(SALES_REVENUE, amount, false),
                    ],
                ),
                1 => (
                    EntrySource::Sale { sale_id: AggregateId::new() },
                    vec![line(COST_OF_GOODS_SOLD, amount / 2, true), line(INVENTORY, amount / 2, false)],
                ),
                _ => (
                    EntrySource::Manual,
                    vec![line(OPERATING_EXPENSES, amount / 10, true), line(CASH, amount / 10, false)],
                ),
            };
            JournalEntryPosted {
                tenant_id,
                ledger_id: LedgerId::for_tenant(tenant_id),
                entry_id: uuid::Uuid::now_v7(),
                posted_on: on,
                description: format!("entry {i}"),
                category: CashFlowCategory::Operating,
                source,
                lines,
                occurred_at: Utc::now(),
            }
        })
        .collect()
}

fn bench_statements(c: &mut Criterion) {
    let mut group = c.benchmark_group("statements");
    let from = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap_or_default();
    let to = NaiveDate::from_ymd_opt(2024, 9, 30).unwrap_or_default();

    for entry_count in [1_000usize, 10_000, 50_000].iter() {
        let entries = books(*entry_count);
        group.throughput(Throughput::Elements(*entry_count as u64));

        group.bench_with_input(BenchmarkId::new("balance_sheet", entry_count), &entries, |b, e| {
            b.iter(|| black_box(balance_sheet(e, to)))
        });
        group.bench_with_input(BenchmarkId::new("profit_and_loss", entry_count), &entries, |b, e| {
            b.iter(|| black_box(profit_and_loss(e, from, to)))
        });
        group.bench_with_input(BenchmarkId::new("cash_flow", entry_count), &entries, |b, e| {
            b.iter(|| black_box(cash_flow(e, from, to)))
        });
        group.bench_with_input(BenchmarkId::new("sales_summary", entry_count), &entries, |b, e| {
            b.iter(|| black_box(sales_summary(e, from, to)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_statements);
criterion_main!(benches);
