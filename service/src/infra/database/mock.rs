//! In-memory [`Database`] used by command tests.
//!
//! Mirrors the Postgres client pair: [`Mock`] answers non-transactional
//! reads, while [`MockTx`] buffers every write into a draft copy of the
//! shared [`Store`] under a store-wide lock. Committing publishes the
//! draft; dropping the transaction discards it. Holding the lock from
//! the first transactional operation until commit gives tests the same
//! serialization the row locks provide in production, which is what the
//! concurrency tests rely on.

use std::{collections::HashMap, sync::Arc};

use common::operations::{
    By, Commit, Delete, Insert, Lock, Select, Transact, Update,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracerr::Traced;

use crate::{
    domain::{cart, order, product, stock, user, Cart, Order, Product, User},
    infra::database::{self, Database},
    read,
};

/// Plain data backing a [`Mock`].
#[derive(Clone, Debug, Default)]
pub(crate) struct Store {
    /// [`User`]s by their IDs.
    pub(crate) users: HashMap<user::Id, User>,

    /// [`Product`]s by their IDs.
    pub(crate) products: HashMap<product::Id, Product>,

    /// [`Cart`]s by their IDs.
    pub(crate) carts: HashMap<cart::Id, Cart>,

    /// [`cart::Line`]s by their composite identity.
    pub(crate) cart_lines: HashMap<(cart::Id, product::Id), cart::Line>,

    /// [`Order`]s by their IDs.
    pub(crate) orders: HashMap<order::Id, Order>,

    /// [`order::Item`]s grouped by their [`Order`].
    pub(crate) order_items: HashMap<order::Id, Vec<order::Item>>,

    /// [`order::StatusHistory`] entries grouped by their [`Order`].
    pub(crate) order_history: HashMap<order::Id, Vec<order::StatusHistory>>,

    /// All recorded [`stock::Movement`]s, in insertion order.
    pub(crate) stock_movements: Vec<stock::Movement>,
}

/// In-memory [`Database`] client.
#[derive(Clone, Debug, Default)]
pub(crate) struct Mock {
    /// Shared [`Store`] of this [`Mock`].
    store: Arc<Mutex<Store>>,
}

impl Mock {
    /// Creates a new [`Mock`] over the provided [`Store`].
    pub(crate) fn with(store: Store) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Returns a copy of the current [`Store`] for assertions.
    pub(crate) async fn snapshot(&self) -> Store {
        self.store.lock().await.clone()
    }

    /// Mutates the current [`Store`] in place, bypassing any
    /// transactional machinery.
    pub(crate) async fn update<F: FnOnce(&mut Store)>(&self, f: F) {
        f(&mut *self.store.lock().await);
    }

    /// Runs `f` over the live [`Store`].
    async fn with_store<R>(&self, f: impl FnOnce(&mut Store) -> R) -> R {
        f(&mut *self.store.lock().await)
    }
}

/// In-memory transactional [`Database`] client.
#[derive(Clone, Debug)]
pub(crate) struct MockTx {
    /// Shared [`Store`] the transaction belongs to.
    store: Arc<Mutex<Store>>,

    /// Lazily started transaction state.
    state: Arc<Mutex<Option<TxState>>>,
}

/// Running state of a [`MockTx`].
#[derive(Debug)]
struct TxState {
    /// Exclusive guard over the shared [`Store`], held until commit or
    /// drop.
    guard: OwnedMutexGuard<Store>,

    /// Draft all operations of the transaction apply to.
    draft: Store,
}

impl MockTx {
    /// Creates a new, not-yet-started [`MockTx`] over the [`Mock`]'s
    /// [`Store`].
    fn from_mock(mock: &Mock) -> Self {
        Self {
            store: Arc::clone(&mock.store),
            state: Arc::new(Mutex::new(None)),
        }
    }

    /// Runs `f` over the transaction's draft, starting the transaction
    /// (taking the store-wide lock) on first use.
    async fn with_draft<R>(&self, f: impl FnOnce(&mut Store) -> R) -> R {
        let mut state = self.state.lock().await;
        if state.is_none() {
            let guard = Arc::clone(&self.store).lock_owned().await;
            let draft = guard.clone();
            *state = Some(TxState { guard, draft });
        }
        f(&mut state.as_mut().expect("just initialized").draft)
    }

    /// Publishes the draft into the shared [`Store`] and releases the
    /// lock. A never-started transaction commits nothing.
    async fn commit(&self) {
        if let Some(TxState { mut guard, draft }) =
            self.state.lock().await.take()
        {
            *guard = draft;
        }
    }
}

impl Database<Transact> for Mock {
    type Ok = MockTx;
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Transact) -> Result<Self::Ok, Self::Err> {
        Ok(MockTx::from_mock(self))
    }
}

impl Database<Transact> for MockTx {
    type Ok = Self;
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Transact) -> Result<Self::Ok, Self::Err> {
        Ok(self.clone())
    }
}

impl Database<Commit> for MockTx {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Commit) -> Result<Self::Ok, Self::Err> {
        self.commit().await;
        Ok(())
    }
}

// Row "locks" are subsumed by the store-wide lock the transaction takes
// on its first operation; the impls only have to force that acquisition.

impl Database<Lock<By<Cart, cart::Id>>> for MockTx {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        _: Lock<By<Cart, cart::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self.with_draft(|_| ()).await)
    }
}

impl Database<Lock<By<Order, order::Id>>> for MockTx {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        _: Lock<By<Order, order::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self.with_draft(|_| ()).await)
    }
}

impl Database<Lock<By<Product, product::Id>>> for MockTx {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        _: Lock<By<Product, product::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self.with_draft(|_| ()).await)
    }
}

impl Database<Select<By<Option<User>, user::Id>>> for Mock {
    type Ok = Option<User>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<User>, user::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        Ok(self.with_store(|s| s.users.get(&id).cloned()).await)
    }
}

impl Database<Select<By<Option<Product>, product::Id>>> for Mock {
    type Ok = Option<Product>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Product>, product::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        Ok(self.with_store(|s| s.products.get(&id).cloned()).await)
    }
}

impl Database<Select<By<Option<Cart>, user::Id>>> for Mock {
    type Ok = Option<Cart>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Cart>, user::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let user_id = by.into_inner();
        Ok(self
            .with_store(|s| {
                s.carts.values().find(|c| c.user_id == user_id).cloned()
            })
            .await)
    }
}

impl Database<Select<By<Option<cart::Line>, (cart::Id, product::Id)>>>
    for Mock
{
    type Ok = Option<cart::Line>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<cart::Line>, (cart::Id, product::Id)>>,
    ) -> Result<Self::Ok, Self::Err> {
        let key = by.into_inner();
        Ok(self.with_store(|s| s.cart_lines.get(&key).cloned()).await)
    }
}

impl Database<Select<By<Vec<order::Id>, read::order::UnpaidSince>>> for Mock {
    type Ok = Vec<order::Id>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<order::Id>, read::order::UnpaidSince>>,
    ) -> Result<Self::Ok, Self::Err> {
        let read::order::UnpaidSince(deadline) = by.into_inner();
        Ok(self
            .with_store(|s| {
                s.orders
                    .values()
                    .filter(|o| {
                        o.payment_status == order::PaymentStatus::Pending
                            && matches!(
                                o.status,
                                order::Status::Pending
                                    | order::Status::Confirmed,
                            )
                            && o.created_at < deadline
                    })
                    .map(|o| o.id)
                    .collect()
            })
            .await)
    }
}

impl Database<Insert<Cart>> for Mock {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(cart): Insert<Cart>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self
            .with_store(|s| drop(s.carts.insert(cart.id, cart)))
            .await)
    }
}

impl Database<Insert<cart::Line>> for Mock {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(line): Insert<cart::Line>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self
            .with_store(|s| {
                drop(
                    s.cart_lines
                        .insert((line.cart_id, line.product_id), line),
                );
            })
            .await)
    }
}

impl Database<Update<cart::Line>> for Mock {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(line): Update<cart::Line>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self
            .with_store(|s| {
                drop(
                    s.cart_lines
                        .insert((line.cart_id, line.product_id), line),
                );
            })
            .await)
    }
}

impl Database<Delete<By<cart::Line, (cart::Id, product::Id)>>> for Mock {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<cart::Line, (cart::Id, product::Id)>>,
    ) -> Result<Self::Ok, Self::Err> {
        let key = by.into_inner();
        Ok(self
            .with_store(|s| drop(s.cart_lines.remove(&key)))
            .await)
    }
}

impl Database<Delete<By<cart::Line, cart::Id>>> for Mock {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<cart::Line, cart::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let cart_id = by.into_inner();
        Ok(self
            .with_store(|s| s.cart_lines.retain(|(c, _), _| *c != cart_id))
            .await)
    }
}

impl Database<Select<By<Option<Cart>, user::Id>>> for MockTx {
    type Ok = Option<Cart>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Cart>, user::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let user_id = by.into_inner();
        Ok(self
            .with_draft(|s| {
                s.carts.values().find(|c| c.user_id == user_id).cloned()
            })
            .await)
    }
}

impl Database<Select<By<Vec<cart::Line>, cart::Id>>> for MockTx {
    type Ok = Vec<cart::Line>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<cart::Line>, cart::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let cart_id = by.into_inner();
        Ok(self
            .with_draft(|s| {
                let mut lines = s
                    .cart_lines
                    .values()
                    .filter(|l| l.cart_id == cart_id)
                    .cloned()
                    .collect::<Vec<_>>();
                lines.sort_by_key(|l| l.product_id);
                lines
            })
            .await)
    }
}

impl Database<Select<By<HashMap<product::Id, Product>, Vec<product::Id>>>>
    for MockTx
{
    type Ok = HashMap<product::Id, Product>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<HashMap<product::Id, Product>, Vec<product::Id>>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let ids = by.into_inner();
        Ok(self
            .with_draft(|s| {
                ids.iter()
                    .filter_map(|id| {
                        s.products.get(id).cloned().map(|p| (*id, p))
                    })
                    .collect()
            })
            .await)
    }
}

impl Database<Select<By<Option<Product>, product::Id>>> for MockTx {
    type Ok = Option<Product>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Product>, product::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        Ok(self.with_draft(|s| s.products.get(&id).cloned()).await)
    }
}

impl Database<Select<By<Option<Order>, order::Id>>> for MockTx {
    type Ok = Option<Order>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Order>, order::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        Ok(self.with_draft(|s| s.orders.get(&id).cloned()).await)
    }
}

impl Database<Select<By<Vec<order::Item>, order::Id>>> for MockTx {
    type Ok = Vec<order::Item>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<order::Item>, order::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        Ok(self
            .with_draft(|s| s.order_items.get(&id).cloned().unwrap_or_default())
            .await)
    }
}

impl Database<Insert<Order>> for MockTx {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(order): Insert<Order>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self
            .with_draft(|s| drop(s.orders.insert(order.id, order)))
            .await)
    }
}

impl Database<Update<Order>> for MockTx {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(order): Update<Order>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self
            .with_draft(|s| drop(s.orders.insert(order.id, order)))
            .await)
    }
}

impl Database<Insert<order::Item>> for MockTx {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(item): Insert<order::Item>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self
            .with_draft(|s| {
                s.order_items.entry(item.order_id).or_default().push(item);
            })
            .await)
    }
}

impl Database<Insert<order::StatusHistory>> for MockTx {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(entry): Insert<order::StatusHistory>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self
            .with_draft(|s| {
                s.order_history
                    .entry(entry.order_id)
                    .or_default()
                    .push(entry);
            })
            .await)
    }
}

impl Database<Insert<stock::Movement>> for MockTx {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(movement): Insert<stock::Movement>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self
            .with_draft(|s| s.stock_movements.push(movement))
            .await)
    }
}

impl Database<Update<Product>> for MockTx {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(product): Update<Product>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self
            .with_draft(|s| drop(s.products.insert(product.id, product)))
            .await)
    }
}

impl Database<Delete<By<cart::Line, cart::Id>>> for MockTx {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<cart::Line, cart::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let cart_id = by.into_inner();
        Ok(self
            .with_draft(|s| s.cart_lines.retain(|(c, _), _| *c != cart_id))
            .await)
    }
}

impl Database<Delete<By<Order, order::Id>>> for MockTx {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<Order, order::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        Ok(self
            .with_draft(|s| {
                drop(s.orders.remove(&id));
                drop(s.order_items.remove(&id));
                drop(s.order_history.remove(&id));
            })
            .await)
    }
}

pub(crate) mod fixtures {
    //! Shared fixtures for command tests.

    use std::time::Duration;

    use common::{DateTime, Money, Percent};
    use rust_decimal::Decimal;

    use crate::{
        domain::{order, pricing, product, user, Product, User},
        task, Config, Service,
    };

    use super::{Mock, Store};

    /// Secret both sides of the JWT handshake use in tests.
    pub(crate) const JWT_SECRET: &[u8] = b"test-secret";

    /// [`Config`] used by command tests.
    pub(crate) fn config() -> Config {
        Config {
            jwt_decoding_key: jsonwebtoken::DecodingKey::from_secret(
                JWT_SECRET,
            ),
            shipping: pricing::ShippingConfig::default(),
            return_window: Duration::from_secs(7 * 24 * 60 * 60),
            expire_stale_orders: task::expire_stale_orders::Config {
                interval: Duration::from_secs(3600),
                timeout: Duration::from_secs(3600),
            },
        }
    }

    /// Builds a [`Service`] over a [`Mock`] seeded with the provided
    /// [`Store`].
    pub(crate) fn service(store: Store) -> (Service<Mock>, Mock) {
        let mock = Mock::with(store);
        (Service::new_detached(config(), mock.clone()), mock)
    }

    /// A regular customer.
    pub(crate) fn user() -> User {
        User {
            id: user::Id::new(),
            phone: "09123456789".parse().unwrap(),
            name: user::Name::new("Sara Ahmadi"),
            email: None,
            is_staff: false,
            is_phone_verified: true,
            created_at: DateTime::now().coerce(),
            deleted_at: None,
        }
    }

    /// A staff member.
    pub(crate) fn staff() -> User {
        User {
            is_staff: true,
            ..user()
        }
    }

    /// An active, undiscounted [`Product`].
    pub(crate) fn product(price: u64, stock: product::Quantity) -> Product {
        discounted(price, stock, 0)
    }

    /// An active [`Product`] with a percentage discount.
    pub(crate) fn discounted(
        price: u64,
        stock: product::Quantity,
        percent: u32,
    ) -> Product {
        Product {
            id: product::Id::new(),
            name: "Acetaminophen 500".parse().unwrap(),
            sku: "ACE-500".parse().unwrap(),
            slug: "acetaminophen-500".parse().unwrap(),
            unit_price: Money::from_rials(price),
            quantity: stock,
            reorder_level: 5,
            is_active: true,
            discount_percent: Percent::new(Decimal::from(percent)).unwrap(),
            discount_per_unit: Money::ZERO,
            created_at: DateTime::now().coerce(),
        }
    }

    /// A Tehran delivery address.
    pub(crate) fn address() -> order::ShippingAddress {
        order::ShippingAddress {
            province: "Tehran".parse().unwrap(),
            city: "Tehran".parse().unwrap(),
            street: "Valiasr St. 12".parse().unwrap(),
            postal_code: "1234567890".parse().unwrap(),
        }
    }
}
