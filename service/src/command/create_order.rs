//! [`Command`] for assembling an [`Order`] out of a [`Cart`].

use std::collections::HashMap;

use common::{
    operations::{
        By, Commit, Delete, Insert, Lock, Select, Transact, Transacted,
        Update,
    },
    DateTime, Money,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;

use crate::{
    domain::{
        cart, order, pricing, product, stock, user, Cart, Order, Product,
        User,
    },
    infra::{database, Database},
    inventory, Service,
};

use super::Command;

/// [`Command`] for converting a [`User`]'s [`Cart`] into an [`Order`].
///
/// The single transactional step of checkout: it either produces a
/// complete [`Order`] with its [`order::Item`]s, decremented stock and an
/// emptied [`Cart`], or changes nothing at all. Prices and discounts are
/// taken from the live catalog at this very moment, never from the cart's
/// price snapshots.
#[derive(Clone, Debug)]
pub struct CreateOrder {
    /// ID of the [`User`] checking out.
    pub user_id: user::Id,

    /// [`order::ShippingAddress`] to deliver this [`Order`] to.
    pub shipping_address: order::ShippingAddress,

    /// Optional [`order::Note`] left by the customer.
    pub customer_note: Option<order::Note>,
}

impl<Db> Command<CreateOrder> for Service<Db>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<User>, user::Id>>,
            Ok = Option<User>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<
            Lock<By<Cart, cart::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Cart>, user::Id>>,
            Ok = Option<Cart>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Vec<cart::Line>, cart::Id>>,
            Ok = Vec<cart::Line>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<HashMap<product::Id, Product>, Vec<product::Id>>>,
            Ok = HashMap<product::Id, Product>,
            Err = Traced<database::Error>,
        > + Database<Insert<Order>, Err = Traced<database::Error>>
        + Database<Insert<order::Item>, Err = Traced<database::Error>>
        + Database<
            Insert<order::StatusHistory>,
            Err = Traced<database::Error>,
        > + Database<
            Delete<By<cart::Line, cart::Id>>,
            Err = Traced<database::Error>,
        > + Database<Commit, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Lock<By<Product, product::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Product>, product::Id>>,
            Ok = Option<Product>,
            Err = Traced<database::Error>,
        > + Database<Update<Product>, Err = Traced<database::Error>>
        + Database<Insert<stock::Movement>, Err = Traced<database::Error>>,
{
    type Ok = Order;
    type Err = Traced<ExecutionError>;

    #[expect(clippy::too_many_lines, reason = "still readable")]
    async fn execute(&self, cmd: CreateOrder) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CreateOrder {
            user_id,
            shipping_address,
            customer_note,
        } = cmd;

        let user = self
            .database()
            .execute(Select(By::<Option<User>, _>::new(user_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .filter(|u| u.deleted_at.is_none())
            .ok_or(E::UserNotExists(user_id))
            .map_err(tracerr::wrap!())?;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let cart = tx
            .execute(Select(By::<Option<Cart>, _>::new(user_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::CartEmpty)
            .map_err(tracerr::wrap!())?;

        // Avoid two checkouts of the same cart racing each other. The
        // cart lock always precedes the product locks, so the global lock
        // order stays acyclic.
        tx.execute(Lock(By::new(cart.id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let lines = tx
            .execute(Select(By::<Vec<cart::Line>, _>::new(cart.id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;
        if lines.is_empty() {
            return Err(tracerr::new!(E::CartEmpty));
        }

        let products = tx
            .execute(Select(By::<HashMap<product::Id, Product>, _>::new(
                lines.iter().map(|l| l.product_id).collect::<Vec<_>>(),
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let order_id = order::Id::new();
        let now: order::CreationDateTime = DateTime::now().coerce();

        let mut subtotal = Money::ZERO;
        let mut discount_amount = Money::ZERO;
        let mut items = Vec::with_capacity(lines.len());
        let mut demands = Vec::with_capacity(lines.len());
        for line in &lines {
            // A vanished or deactivated product aborts the checkout; the
            // cart view is responsible for surfacing it beforehand.
            let product = products
                .get(&line.product_id)
                .filter(|p| p.is_active)
                .ok_or(E::ProductUnavailable(line.product_id))
                .map_err(tracerr::wrap!())?;
            if line.quantity > product.quantity {
                return Err(tracerr::new!(E::InsufficientStock {
                    product_id: product.id,
                    available: product.quantity,
                }));
            }

            let totals = pricing::line_totals(
                product.unit_price,
                line.quantity,
                &product.discount(),
            );
            subtotal += totals.subtotal;
            discount_amount += totals.discount;

            items.push(order::Item {
                order_id,
                product_id: product.id,
                product_name: product.name.clone(),
                product_sku: product.sku.clone(),
                unit_price: product.unit_price,
                quantity: line.quantity,
                discount_percent: product.discount_percent,
                discount_per_unit: product.discount_per_unit,
                line_subtotal: totals.subtotal,
                line_discount: totals.discount,
                line_total: totals.total,
                created_at: now,
            });
            demands.push(inventory::Demand {
                product_id: product.id,
                quantity: line.quantity,
            });
        }

        let shipping_cost =
            pricing::order_shipping_cost(&self.config().shipping, subtotal);
        let total_amount =
            subtotal.saturating_sub(discount_amount) + shipping_cost;

        let order = Order {
            id: order_id,
            number: order::Number::generate(now),
            user_id: user.id,
            status: order::Status::Pending,
            payment_status: order::PaymentStatus::Pending,
            subtotal,
            discount_amount,
            shipping_cost,
            total_amount,
            shipping_address,
            customer_name: user.contact_name().into(),
            customer_phone: user.phone.clone(),
            customer_note,
            payment_authority: None,
            payment_ref_id: None,
            created_at: now,
            confirmed_at: None,
            shipped_at: None,
            delivered_at: None,
            paid_at: None,
        };
        tx.execute(Insert(order.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        for item in items {
            tx.execute(Insert(item))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
        }

        inventory::reserve_and_decrement(&tx, &demands, Some(user.id), None)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        tx.execute(Insert(order::StatusHistory {
            order_id,
            previous_status: None,
            new_status: order::Status::Pending,
            changed_by: Some(user.id),
            note: None,
            created_at: DateTime::now().coerce(),
        }))
        .await
        .map_err(tracerr::map_from_and_wrap!(=> E))
        .map(drop)?;

        tx.execute(Delete(By::<cart::Line, _>::new(cart.id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        Ok(order)
    }
}

/// Error of [`CreateOrder`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// The [`Cart`] holds no lines.
    #[display("Cart is empty")]
    CartEmpty,

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Product`] is short on on-hand stock.
    #[display(
        "`Product(id: {product_id})` has only {available} unit(s) in stock"
    )]
    InsufficientStock {
        /// ID of the short [`Product`].
        product_id: product::Id,

        /// Units actually available.
        available: product::Quantity,
    },

    /// [`Product`] is inactive or vanished from the catalog.
    #[display("`Product(id: {_0})` is not available")]
    ProductUnavailable(#[error(not(source))] product::Id),

    /// [`User`] with the provided ID does not exist.
    #[display("`User(id: {_0})` does not exist")]
    UserNotExists(#[error(not(source))] user::Id),
}

impl From<inventory::Error> for ExecutionError {
    fn from(e: inventory::Error) -> Self {
        match e {
            inventory::Error::Db(e) => Self::Db(e),
            inventory::Error::InsufficientStock {
                product_id,
                available,
            } => Self::InsufficientStock {
                product_id,
                available,
            },
            inventory::Error::ProductNotExists(id) => {
                Self::ProductUnavailable(id)
            }
        }
    }
}

#[cfg(test)]
mod spec {
    use common::{Handler as _, Money};

    use crate::{
        command::AddToCart,
        domain::{order, stock},
        infra::database::mock::{fixtures, Store},
    };

    use super::{CreateOrder, ExecutionError};

    #[tokio::test]
    async fn assembles_order_with_live_prices() {
        let user = fixtures::user();
        let a = fixtures::discounted(100_000, 10, 10);
        let b = fixtures::product(50_000, 5);
        let mut store = Store::default();
        drop(store.users.insert(user.id, user.clone()));
        drop(store.products.insert(a.id, a.clone()));
        drop(store.products.insert(b.id, b.clone()));
        let (service, mock) = fixtures::service(store);

        drop(
            service
                .execute(AddToCart {
                    user_id: user.id,
                    product_id: a.id,
                    quantity: 2,
                })
                .await
                .unwrap(),
        );
        drop(
            service
                .execute(AddToCart {
                    user_id: user.id,
                    product_id: b.id,
                    quantity: 1,
                })
                .await
                .unwrap(),
        );

        let order = service
            .execute(CreateOrder {
                user_id: user.id,
                shipping_address: fixtures::address(),
                customer_note: None,
            })
            .await
            .unwrap();

        assert_eq!(order.status, order::Status::Pending);
        assert_eq!(order.payment_status, order::PaymentStatus::Pending);
        assert_eq!(order.subtotal, Money::from_rials(250_000));
        assert_eq!(order.discount_amount, Money::from_rials(20_000));
        assert_eq!(order.shipping_cost, Money::from_rials(25_000));
        assert_eq!(order.total_amount, Money::from_rials(255_000));
        assert_eq!(order.customer_phone, user.phone);

        let store = mock.snapshot().await;

        // Stock decremented exactly once per line, with audit movements.
        assert_eq!(store.products[&a.id].quantity, 8);
        assert_eq!(store.products[&b.id].quantity, 4);
        let sales = store
            .stock_movements
            .iter()
            .filter(|m| m.kind == stock::Kind::Sale)
            .count();
        assert_eq!(sales, 2);

        // Items snapshot the catalog state.
        let items = &store.order_items[&order.id];
        assert_eq!(items.len(), 2);
        let item_a = items.iter().find(|i| i.product_id == a.id).unwrap();
        assert_eq!(item_a.unit_price, Money::from_rials(100_000));
        assert_eq!(item_a.line_subtotal, Money::from_rials(200_000));
        assert_eq!(item_a.line_discount, Money::from_rials(20_000));
        assert_eq!(item_a.line_total, Money::from_rials(180_000));
        assert_eq!(item_a.product_name, a.name);
        assert_eq!(item_a.product_sku, a.sku);

        // Cart emptied; initial history entry appended.
        assert!(store.cart_lines.is_empty());
        let history = &store.order_history[&order.id];
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].previous_status, None);
        assert_eq!(history[0].new_status, order::Status::Pending);
    }

    #[tokio::test]
    async fn rejects_empty_cart() {
        let user = fixtures::user();
        let mut store = Store::default();
        drop(store.users.insert(user.id, user.clone()));
        let (service, _) = fixtures::service(store);

        let result = service
            .execute(CreateOrder {
                user_id: user.id,
                shipping_address: fixtures::address(),
                customer_note: None,
            })
            .await;

        assert!(matches!(
            result.unwrap_err().as_ref(),
            ExecutionError::CartEmpty,
        ));
    }

    #[tokio::test]
    async fn checkout_is_all_or_nothing() {
        let user = fixtures::user();
        let a = fixtures::product(100_000, 5);
        let b = fixtures::product(70_000, 2);
        let mut store = Store::default();
        drop(store.users.insert(user.id, user.clone()));
        drop(store.products.insert(a.id, a.clone()));
        drop(store.products.insert(b.id, b.clone()));
        let (service, mock) = fixtures::service(store);

        drop(
            service
                .execute(AddToCart {
                    user_id: user.id,
                    product_id: a.id,
                    quantity: 1,
                })
                .await
                .unwrap(),
        );
        drop(
            service
                .execute(AddToCart {
                    user_id: user.id,
                    product_id: b.id,
                    quantity: 2,
                })
                .await
                .unwrap(),
        );

        // The second line becomes overstocked behind the cart's back.
        mock.update(|store| {
            store.products.get_mut(&b.id).unwrap().quantity = 1;
        })
        .await;

        let result = service
            .execute(CreateOrder {
                user_id: user.id,
                shipping_address: fixtures::address(),
                customer_note: None,
            })
            .await;

        assert!(matches!(
            result.unwrap_err().as_ref(),
            ExecutionError::InsufficientStock {
                available: 1,
                ..
            },
        ));

        // Nothing happened: no order, no items, no decrement, cart kept.
        let store = mock.snapshot().await;
        assert!(store.orders.is_empty());
        assert!(store.order_items.is_empty());
        assert!(store.stock_movements.is_empty());
        assert_eq!(store.products[&a.id].quantity, 5);
        assert_eq!(store.products[&b.id].quantity, 1);
        assert_eq!(store.cart_lines.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_checkouts_cannot_oversell_the_last_unit() {
        let alice = fixtures::user();
        let bob = fixtures::user();
        let product = fixtures::product(100_000, 1);
        let mut store = Store::default();
        drop(store.users.insert(alice.id, alice.clone()));
        drop(store.users.insert(bob.id, bob.clone()));
        drop(store.products.insert(product.id, product.clone()));
        let (service, mock) = fixtures::service(store);

        for user_id in [alice.id, bob.id] {
            drop(
                service
                    .execute(AddToCart {
                        user_id,
                        product_id: product.id,
                        quantity: 1,
                    })
                    .await
                    .unwrap(),
            );
        }

        let (first, second) = tokio::join!(
            service.execute(CreateOrder {
                user_id: alice.id,
                shipping_address: fixtures::address(),
                customer_note: None,
            }),
            service.execute(CreateOrder {
                user_id: bob.id,
                shipping_address: fixtures::address(),
                customer_note: None,
            }),
        );

        let succeeded =
            usize::from(first.is_ok()) + usize::from(second.is_ok());
        assert_eq!(succeeded, 1, "exactly one checkout must win");
        let lost = if first.is_ok() { second } else { first };
        assert!(matches!(
            lost.unwrap_err().as_ref(),
            ExecutionError::InsufficientStock {
                available: 0,
                ..
            },
        ));

        let store = mock.snapshot().await;
        assert_eq!(store.products[&product.id].quantity, 0);
        assert_eq!(store.orders.len(), 1);
    }

    #[tokio::test]
    async fn order_is_immune_to_later_price_changes() {
        let user = fixtures::user();
        let product = fixtures::product(100_000, 10);
        let mut store = Store::default();
        drop(store.users.insert(user.id, user.clone()));
        drop(store.products.insert(product.id, product.clone()));
        let (service, mock) = fixtures::service(store);

        drop(
            service
                .execute(AddToCart {
                    user_id: user.id,
                    product_id: product.id,
                    quantity: 1,
                })
                .await
                .unwrap(),
        );
        let order = service
            .execute(CreateOrder {
                user_id: user.id,
                shipping_address: fixtures::address(),
                customer_note: None,
            })
            .await
            .unwrap();

        mock.update(|store| {
            store.products.get_mut(&product.id).unwrap().unit_price =
                Money::from_rials(999_000);
        })
        .await;

        let store = mock.snapshot().await;
        let persisted = &store.orders[&order.id];
        let item = &store.order_items[&order.id][0];

        assert_eq!(persisted.total_amount, order.total_amount);
        assert_eq!(item.unit_price, Money::from_rials(100_000));
        assert_eq!(item.line_total, Money::from_rials(100_000));
    }
}
