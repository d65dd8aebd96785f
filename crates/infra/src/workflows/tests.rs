use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value as JsonValue;

use stockledger_accounting::{JournalEntryPosted, statements};
use stockledger_catalog::{
    AddVariation, Attributes, CreateProduct, NewVariation, ProductCommand, ProductEvent, ProductId, VariantKey,
};
use stockledger_core::{AggregateId, ExpectedVersion, Money, TenantId};
use stockledger_debts::{DebtDirection, DebtStatus};
use stockledger_events::{EventEnvelope, InMemoryEventBus};
use stockledger_import::{CatalogRow, ImportReport};
use stockledger_parties::{ContactInfo, CreateParty, PartyCommand, PartyId, PartyKind};
use stockledger_purchasing::{PlaceOrder, PurchaseCommand, PurchaseId, PurchaseStatus};
use stockledger_sales::{SaleId, SaleStatus};
use stockledger_storage::{AllocateStock, CreateStorage, StockSource, StorageCommand, StorageId};

use super::debts::{purchase_debt_id, sale_debt_id};
use super::*;
use crate::event_store::{EventStoreError, InMemoryEventStore, UncommittedEvent};
use crate::projections::ReadModels;

/// In-memory store whose next append to one chosen stream fails.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryEventStore,
    fail_next: Mutex<Option<AggregateId>>,
}

impl FlakyStore {
    fn fail_next_append_to(&self, aggregate_id: AggregateId) {
        *self.fail_next.lock().unwrap() = Some(aggregate_id);
    }
}

impl EventStore for FlakyStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let target = events.first().map(|e| e.aggregate_id);
        {
            let mut fail_next = self.fail_next.lock().unwrap();
            if target.is_some() && *fail_next == target {
                *fail_next = None;
                return Err(EventStoreError::Backend("disk full".into()));
            }
        }
        self.inner.append(events, expected_version)
    }

    fn load_stream(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.load_stream(tenant_id, aggregate_id)
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.load_all()
    }
}

type Store = Arc<FlakyStore>;
type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

/// Workflows wired to a store and to read models fed only through the commit sink.
struct Fixture {
    dispatcher: CommandDispatcher<Store, Bus>,
    read_models: ReadModels,
    tenant: TenantId,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dispatcher: CommandDispatcher::new(Arc::new(FlakyStore::default()), Arc::new(InMemoryEventBus::new())),
            read_models: ReadModels::new(),
            tenant: TenantId::new(),
        }
    }

    fn wf(&self) -> Workflows<'_, Store, Bus> {
        Workflows::new(&self.dispatcher).with_sink(&self.read_models)
    }

    fn product(&self, sku: &str, price: i64, cost: i64) -> VariantKey {
        let product_id = ProductId::new(AggregateId::new());
        self.wf()
            .dispatch_product(
                self.tenant,
                product_id,
                ProductCommand::CreateProduct(CreateProduct {
                    tenant_id: self.tenant,
                    product_id,
                    sku: sku.to_string(),
                    name: format!("Product {sku}"),
                    category: None,
                    unit: None,
                    description: None,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
        let committed = self
            .wf()
            .dispatch_product(
                self.tenant,
                product_id,
                ProductCommand::AddVariation(AddVariation {
                    tenant_id: self.tenant,
                    product_id,
                    variation: NewVariation {
                        sku: format!("{sku}-STD"),
                        attributes: Attributes::default(),
                        sale_price: Money::from_cents(price),
                        purchase_cost: Money::from_cents(cost),
                    },
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
        let decoded: Vec<ProductEvent> = decode(&committed).unwrap();
        match &decoded[0] {
            ProductEvent::VariationAdded(added) => VariantKey::new(product_id, added.variation.variation_id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    fn storage(&self, name: &str, capacity: Option<u64>) -> StorageId {
        let storage_id = StorageId::new(AggregateId::new());
        self.wf()
            .dispatch_storage(
                self.tenant,
                storage_id,
                StorageCommand::CreateStorage(CreateStorage {
                    tenant_id: self.tenant,
                    storage_id,
                    name: name.to_string(),
                    location: None,
                    capacity,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
        storage_id
    }

    fn stock(&self, storage_id: StorageId, key: VariantKey, quantity: u64) {
        self.wf()
            .dispatch_storage(
                self.tenant,
                storage_id,
                StorageCommand::AllocateStock(AllocateStock {
                    tenant_id: self.tenant,
                    storage_id,
                    key,
                    quantity,
                    source: StockSource::Opening,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
    }

    fn party(&self, kind: PartyKind) -> PartyId {
        let party_id = PartyId::new(AggregateId::new());
        self.wf()
            .dispatch_party(
                self.tenant,
                party_id,
                PartyCommand::CreateParty(CreateParty {
                    tenant_id: self.tenant,
                    party_id,
                    kind,
                    name: "Acme".to_string(),
                    contact: ContactInfo::default(),
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
        party_id
    }

    fn on_hand(&self, storage_id: StorageId, key: VariantKey) -> u64 {
        self.wf().storage(self.tenant, storage_id).unwrap().on_hand(&key)
    }

    fn entries(&self) -> Vec<JournalEntryPosted> {
        let read_models = ReadModels::new();
        read_models.rebuild(self.dispatcher.store()).unwrap();
        read_models.ledger.entries(self.tenant)
    }

    fn account(&self, code: &str) -> (Money, Money) {
        let entries = self.entries();
        statements::balances(&entries, |_| true)
            .get(code)
            .map(|b| (b.debits, b.credits))
            .unwrap_or_default()
    }

    fn sale_with_line(&self, customer: Option<PartyId>, storage_id: StorageId, key: VariantKey, qty: u64) -> SaleId {
        let sale_id = SaleId::new(AggregateId::new());
        self.wf().create_sale(self.tenant, sale_id, customer).unwrap();
        self.wf()
            .add_sale_line(self.tenant, sale_id, key, storage_id, qty, None, Money::ZERO)
            .unwrap();
        sale_id
    }
}

#[test]
fn credit_sale_releases_stock_opens_receivable_and_posts_balanced_entries() {
    let f = Fixture::new();
    let key = f.product("TEE", 2000, 800);
    let main = f.storage("Main", None);
    f.stock(main, key, 10);
    let customer = f.party(PartyKind::Customer);
    let sale_id = f.sale_with_line(Some(customer), main, key, 3);

    f.wf()
        .complete_sale(f.tenant, sale_id, Money::from_cents(1000), None)
        .unwrap();

    assert_eq!(f.on_hand(main, key), 7);
    let debt = f.wf().debt(f.tenant, sale_debt_id(sale_id)).unwrap();
    assert_eq!(debt.direction(), DebtDirection::Receivable);
    assert_eq!(debt.outstanding(), Money::from_cents(5000));

    let entries = f.entries();
    assert_eq!(entries.len(), 2);
    for e in &entries {
        let debits: Money = e.lines.iter().filter(|l| l.is_debit).map(|l| l.amount).sum();
        let credits: Money = e.lines.iter().filter(|l| !l.is_debit).map(|l| l.amount).sum();
        assert_eq!(debits, credits);
    }
    assert_eq!(f.account("1100"), (Money::from_cents(5000), Money::ZERO));
    assert_eq!(f.account("5000"), (Money::from_cents(2400), Money::ZERO));

    f.wf()
        .record_sale_payment(f.tenant, sale_id, Money::from_cents(2000))
        .unwrap();
    let debt = f.wf().debt(f.tenant, sale_debt_id(sale_id)).unwrap();
    assert_eq!(debt.outstanding(), Money::from_cents(3000));
    assert_eq!(f.wf().sale(f.tenant, sale_id).unwrap().paid(), Money::from_cents(3000));
    assert_eq!(f.account("1100"), (Money::from_cents(5000), Money::from_cents(2000)));
}

#[test]
fn failed_release_restocks_earlier_lines_and_keeps_the_sale_draft() {
    let f = Fixture::new();
    let key = f.product("MUG", 2000, 500);
    let front = f.storage("Front", None);
    let back = f.storage("Back", None);
    f.stock(front, key, 5);

    let sale_id = f.sale_with_line(None, front, key, 2);
    f.wf()
        .add_sale_line(f.tenant, sale_id, key, back, 1, None, Money::ZERO)
        .unwrap();

    let err = f
        .wf()
        .complete_sale(f.tenant, sale_id, Money::from_cents(6000), None)
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvariantViolation(_)));
    assert_eq!(f.on_hand(front, key), 5);
    assert_eq!(f.wf().sale(f.tenant, sale_id).unwrap().status(), SaleStatus::Draft);
    assert!(f.entries().is_empty());
}

#[test]
fn walk_in_sale_paid_short_fails_before_stock_moves() {
    let f = Fixture::new();
    let key = f.product("CAP", 1500, 600);
    let main = f.storage("Main", None);
    f.stock(main, key, 2);
    let sale_id = f.sale_with_line(None, main, key, 1);

    let err = f
        .wf()
        .complete_sale(f.tenant, sale_id, Money::from_cents(100), None)
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvariantViolation(_)));
    assert_eq!(f.on_hand(main, key), 2);
}

#[test]
fn return_restores_stock_and_nets_the_ledger_to_zero() {
    let f = Fixture::new();
    let key = f.product("HAT", 1000, 400);
    let main = f.storage("Main", None);
    f.stock(main, key, 4);
    let customer = f.party(PartyKind::Customer);
    let sale_id = f.sale_with_line(Some(customer), main, key, 2);
    f.wf()
        .complete_sale(f.tenant, sale_id, Money::from_cents(500), None)
        .unwrap();

    f.wf().return_sale(f.tenant, sale_id, Some("wrong size".into())).unwrap();

    assert_eq!(f.on_hand(main, key), 4);
    assert_eq!(f.wf().sale(f.tenant, sale_id).unwrap().status(), SaleStatus::Returned);
    let debt = f.wf().debt(f.tenant, sale_debt_id(sale_id)).unwrap();
    assert_eq!(debt.status(), DebtStatus::WrittenOff);
    for code in ["1000", "1100", "1200", "4000", "5000", "6100"] {
        let (debits, credits) = f.account(code);
        assert_eq!(debits, credits, "account {code} should net to zero");
    }
}

#[test]
fn sale_for_suspended_or_unknown_customer_is_rejected() {
    let f = Fixture::new();
    let supplier = f.party(PartyKind::Supplier);
    let err = f
        .wf()
        .create_sale(f.tenant, SaleId::new(AggregateId::new()), Some(supplier))
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));

    let err = f
        .wf()
        .create_sale(f.tenant, SaleId::new(AggregateId::new()), Some(PartyId::new(AggregateId::new())))
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound(_)));
}

fn received_purchase(f: &Fixture, key: VariantKey, quantity: u64) -> PurchaseId {
    let supplier = f.party(PartyKind::Supplier);
    let purchase_id = PurchaseId::new(AggregateId::new());
    f.wf()
        .create_purchase(
            f.tenant,
            purchase_id,
            supplier,
            Some("PO-1".into()),
            vec![NewPurchaseLine {
                key,
                quantity,
                unit_cost: None,
            }],
        )
        .unwrap();
    f.wf()
        .dispatch_purchase(
            f.tenant,
            purchase_id,
            PurchaseCommand::PlaceOrder(PlaceOrder {
                tenant_id: f.tenant,
                purchase_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    f.wf()
        .receive_purchase(f.tenant, purchase_id, vec![], Money::ZERO, None)
        .unwrap();
    purchase_id
}

#[test]
fn allocation_wizard_checks_capacity_before_touching_the_purchase() {
    let f = Fixture::new();
    let key = f.product("BOX", 900, 500);
    let shelf = f.storage("Shelf", Some(5));
    let floor = f.storage("Floor", None);
    let purchase_id = received_purchase(&f, key, 8);

    let payable = f.wf().debt(f.tenant, purchase_debt_id(purchase_id)).unwrap();
    assert_eq!(payable.outstanding(), Money::from_cents(4000));
    assert_eq!(f.account("1200"), (Money::from_cents(4000), Money::ZERO));

    assert!(f.wf().allocate_to_storage(f.tenant, purchase_id, 1, shelf, 8).is_err());
    let purchase = f.wf().purchase(f.tenant, purchase_id).unwrap();
    assert_eq!(purchase.line(1).unwrap().allocated, 0);
    assert_eq!(f.on_hand(shelf, key), 0);

    f.wf().allocate_to_storage(f.tenant, purchase_id, 1, shelf, 5).unwrap();
    f.wf().allocate_to_storage(f.tenant, purchase_id, 1, floor, 3).unwrap();

    let purchase = f.wf().purchase(f.tenant, purchase_id).unwrap();
    assert_eq!(purchase.status(), PurchaseStatus::Allocated);
    assert_eq!(f.on_hand(shelf, key), 5);
    assert_eq!(f.on_hand(floor, key), 3);

    let err = f.wf().allocate_to_storage(f.tenant, purchase_id, 9, floor, 1).unwrap_err();
    assert!(matches!(err, DispatchError::NotFound(_)));
}

#[test]
fn purchase_payment_repays_the_payable() {
    let f = Fixture::new();
    let key = f.product("BAG", 900, 250);
    let purchase_id = received_purchase(&f, key, 4);

    f.wf()
        .record_purchase_payment(f.tenant, purchase_id, Money::from_cents(1000))
        .unwrap();

    let payable = f.wf().debt(f.tenant, purchase_debt_id(purchase_id)).unwrap();
    assert_eq!(payable.status(), DebtStatus::Settled);
    assert_eq!(f.account("2000"), (Money::from_cents(1000), Money::from_cents(1000)));
}

#[test]
fn debt_repayment_is_mirrored_on_the_sale() {
    let f = Fixture::new();
    let key = f.product("PEN", 300, 100);
    let main = f.storage("Main", None);
    f.stock(main, key, 10);
    let customer = f.party(PartyKind::Customer);
    let sale_id = f.sale_with_line(Some(customer), main, key, 10);
    f.wf().complete_sale(f.tenant, sale_id, Money::ZERO, None).unwrap();

    f.wf()
        .repay_debt(f.tenant, sale_debt_id(sale_id), Money::from_cents(3000), None)
        .unwrap();

    assert_eq!(f.wf().debt(f.tenant, sale_debt_id(sale_id)).unwrap().status(), DebtStatus::Settled);
    assert!(f.wf().sale(f.tenant, sale_id).unwrap().outstanding().is_zero());
}

#[test]
fn write_off_posts_bad_debt() {
    let f = Fixture::new();
    let key = f.product("INK", 500, 200);
    let main = f.storage("Main", None);
    f.stock(main, key, 1);
    let customer = f.party(PartyKind::Customer);
    let sale_id = f.sale_with_line(Some(customer), main, key, 1);
    f.wf().complete_sale(f.tenant, sale_id, Money::ZERO, None).unwrap();

    f.wf()
        .write_off_debt(f.tenant, sale_debt_id(sale_id), "customer vanished".into())
        .unwrap();

    assert_eq!(f.account("6100"), (Money::from_cents(500), Money::ZERO));
    let (ar_debits, ar_credits) = f.account("1100");
    assert_eq!(ar_debits, ar_credits);
}

#[test]
fn transfer_moves_units_and_refuses_an_overfull_target() {
    let f = Fixture::new();
    let key = f.product("CUP", 400, 100);
    let a = f.storage("A", None);
    let b = f.storage("B", Some(2));
    f.stock(a, key, 4);

    assert!(f.wf().transfer_stock(f.tenant, a, b, key, 3).is_err());
    assert_eq!(f.on_hand(a, key), 4);
    assert_eq!(f.on_hand(b, key), 0);

    f.wf().transfer_stock(f.tenant, a, b, key, 2).unwrap();
    assert_eq!(f.on_hand(a, key), 2);
    assert_eq!(f.on_hand(b, key), 2);

    let err = f.wf().transfer_stock(f.tenant, a, a, key, 1).unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));
}

fn catalog_row(variation_sku: &str, attributes: &str, opening: u64, storage: Option<&str>) -> CatalogRow {
    CatalogRow {
        product_name: "Tee".into(),
        product_sku: "TEE".into(),
        category: Some("Apparel".into()),
        variation_sku: variation_sku.into(),
        attributes: Attributes::parse(attributes).unwrap(),
        price: Money::from_cents(2000),
        cost: Money::from_cents(800),
        opening_quantity: opening,
        storage: storage.map(str::to_string),
    }
}

#[test]
fn catalog_import_groups_rows_and_allocates_opening_stock() {
    let f = Fixture::new();
    let report = ImportReport {
        rows: vec![
            (2, catalog_row("TEE-S", "size=S", 0, None)),
            (3, catalog_row("TEE-M", "size=M", 5, Some("Back room"))),
            (4, catalog_row("TEE-L", "size=L", 2, None)),
        ],
        errors: vec![],
    };

    let outcome = f.wf().import_catalog(f.tenant, report, &[], &[]);

    assert_eq!(outcome.products.len(), 1);
    let product = &outcome.products[0];
    assert!(product.created);
    assert_eq!(product.variations.len(), 2);
    assert_eq!(outcome.storages_created.len(), 1);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].row, 4);

    let medium = product.variations.iter().find(|(sku, _)| sku == "TEE-M").unwrap().1;
    let key = VariantKey::new(product.product_id, medium);
    assert_eq!(f.on_hand(outcome.storages_created[0], key), 5);
}

#[test]
fn payment_on_a_written_off_purchase_is_refused() {
    let f = Fixture::new();
    let key = f.product("LAMP", 1500, 500);
    let purchase_id = received_purchase(&f, key, 2);
    f.wf()
        .write_off_debt(f.tenant, purchase_debt_id(purchase_id), "supplier waived".into())
        .unwrap();

    let err = f
        .wf()
        .record_purchase_payment(f.tenant, purchase_id, Money::from_cents(500))
        .unwrap_err();
    assert!(matches!(err, DispatchError::Conflict(_)));

    let purchase = f.wf().purchase(f.tenant, purchase_id).unwrap();
    assert_eq!(purchase.paid(), Money::ZERO);
    assert_eq!(f.account("1000"), (Money::ZERO, Money::ZERO));
}

#[test]
fn payment_on_a_written_off_sale_is_refused() {
    let f = Fixture::new();
    let key = f.product("MUG", 800, 300);
    let main = f.storage("Main", None);
    f.stock(main, key, 2);
    let customer = f.party(PartyKind::Customer);
    let sale_id = f.sale_with_line(Some(customer), main, key, 2);
    f.wf().complete_sale(f.tenant, sale_id, Money::ZERO, None).unwrap();
    f.wf()
        .write_off_debt(f.tenant, sale_debt_id(sale_id), "customer vanished".into())
        .unwrap();

    let err = f
        .wf()
        .record_sale_payment(f.tenant, sale_id, Money::from_cents(800))
        .unwrap_err();
    assert!(matches!(err, DispatchError::Conflict(_)));

    assert_eq!(f.wf().sale(f.tenant, sale_id).unwrap().paid(), Money::ZERO);
    assert_eq!(f.account("1000"), (Money::ZERO, Money::ZERO));
}

#[test]
fn failed_transfer_target_append_puts_units_back_in_the_source() {
    let f = Fixture::new();
    let key = f.product("JUG", 600, 200);
    let a = f.storage("A", None);
    let b = f.storage("B", None);
    f.stock(a, key, 4);

    f.dispatcher.store().fail_next_append_to(b.0);
    let err = f.wf().transfer_stock(f.tenant, a, b, key, 3).unwrap_err();
    assert!(matches!(err, DispatchError::Store(_)));

    assert_eq!(f.on_hand(a, key), 4);
    assert_eq!(f.on_hand(b, key), 0);
    let seen = f.read_models.storages.get(f.tenant, a.0).unwrap();
    assert_eq!(seen.on_hand(&key), 4);
}

#[test]
fn failed_storage_append_reverts_the_wizard_step() {
    let f = Fixture::new();
    let key = f.product("CRATE", 900, 400);
    let floor = f.storage("Floor", None);
    let purchase_id = received_purchase(&f, key, 6);

    f.dispatcher.store().fail_next_append_to(floor.0);
    let err = f.wf().allocate_to_storage(f.tenant, purchase_id, 1, floor, 4).unwrap_err();
    assert!(matches!(err, DispatchError::Store(_)));

    let purchase = f.wf().purchase(f.tenant, purchase_id).unwrap();
    assert_eq!(purchase.line(1).unwrap().allocated, 0);
    assert_eq!(purchase.status(), PurchaseStatus::Received);
    let seen = f.read_models.purchases.get(f.tenant, purchase_id.0).unwrap();
    assert_eq!(seen.line(1).unwrap().allocated, 0);
    assert_eq!(f.on_hand(floor, key), 0);
}

#[test]
fn failed_release_append_restocks_and_read_models_follow() {
    let f = Fixture::new();
    let key = f.product("FAN", 3000, 1200);
    let front = f.storage("Front", None);
    let back = f.storage("Back", None);
    f.stock(front, key, 2);
    f.stock(back, key, 2);
    let sale_id = f.sale_with_line(None, front, key, 2);
    f.wf()
        .add_sale_line(f.tenant, sale_id, key, back, 1, None, Money::ZERO)
        .unwrap();

    f.dispatcher.store().fail_next_append_to(back.0);
    let err = f
        .wf()
        .complete_sale(f.tenant, sale_id, Money::from_cents(9000), None)
        .unwrap_err();
    assert!(matches!(err, DispatchError::Store(_)));

    assert_eq!(f.on_hand(front, key), 2);
    assert_eq!(f.read_models.storages.get(f.tenant, front.0).unwrap().on_hand(&key), 2);
    assert_eq!(f.read_models.storages.get(f.tenant, back.0).unwrap().on_hand(&key), 2);
    assert_eq!(f.wf().sale(f.tenant, sale_id).unwrap().status(), SaleStatus::Draft);
}
