//! [`Order`]-related [`Database`] implementations.

use common::operations::{By, Delete, Insert, Lock, Select, Update};
use itertools::Itertools as _;
use postgres_types::ToSql;
use tokio_postgres::Row;
use tracerr::Traced;

use crate::{
    domain::{order, Order},
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
    read,
};

/// Maps the provided [`Row`] into an [`Order`].
fn order_from_row(row: &Row) -> Order {
    Order {
        id: row.get("id"),
        number: row.get("number"),
        user_id: row.get("user_id"),
        status: row.get("status"),
        payment_status: row.get("payment_status"),
        subtotal: row.get("subtotal"),
        discount_amount: row.get("discount_amount"),
        shipping_cost: row.get("shipping_cost"),
        total_amount: row.get("total_amount"),
        shipping_address: order::ShippingAddress {
            province: row.get("ship_province"),
            city: row.get("ship_city"),
            street: row.get("ship_street"),
            postal_code: row.get("ship_postal_code"),
        },
        customer_name: row.get("customer_name"),
        customer_phone: row.get("customer_phone"),
        customer_note: row.get("customer_note"),
        payment_authority: row.get("payment_authority"),
        payment_ref_id: row.get("payment_ref_id"),
        created_at: row.get("created_at"),
        confirmed_at: row.get("confirmed_at"),
        shipped_at: row.get("shipped_at"),
        delivered_at: row.get("delivered_at"),
        paid_at: row.get("paid_at"),
    }
}

/// Columns of the `orders` table, in the [`order_from_row()`] order.
const ORDER_COLUMNS: &str = "\
    id, number, user_id, status, payment_status, \
    subtotal, discount_amount, shipping_cost, total_amount, \
    ship_province, ship_city, ship_street, ship_postal_code, \
    customer_name, customer_phone, customer_note, \
    payment_authority, payment_ref_id, \
    created_at, confirmed_at, shipped_at, delivered_at, paid_at";

impl<C> Database<Select<By<Option<Order>, order::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Order>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Order>, order::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: order::Id = by.into_inner();

        let sql = format!(
            "SELECT {ORDER_COLUMNS} \
             FROM orders \
             WHERE id = $1::UUID \
             LIMIT 1",
        );
        Ok(self
            .query_opt(sql.as_str(), &[&id])
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(order_from_row))
    }
}

impl<C> Database<Insert<Order>> for Postgres<C>
where
    C: Connection,
    Self: Database<Update<Order>, Ok = (), Err = Traced<database::Error>>,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(order): Insert<Order>,
    ) -> Result<Self::Ok, Self::Err> {
        self.execute(Update(order)).await.map_err(tracerr::wrap!())
    }
}

impl<C> Database<Update<Order>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(order): Update<Order>,
    ) -> Result<Self::Ok, Self::Err> {
        let Order {
            id,
            number,
            user_id,
            status,
            payment_status,
            subtotal,
            discount_amount,
            shipping_cost,
            total_amount,
            shipping_address:
                order::ShippingAddress {
                    province,
                    city,
                    street,
                    postal_code,
                },
            customer_name,
            customer_phone,
            customer_note,
            payment_authority,
            payment_ref_id,
            created_at,
            confirmed_at,
            shipped_at,
            delivered_at,
            paid_at,
        } = order;

        const SQL: &str = "\
            INSERT INTO orders (\
                id, number, user_id, status, payment_status, \
                subtotal, discount_amount, shipping_cost, total_amount, \
                ship_province, ship_city, ship_street, ship_postal_code, \
                customer_name, customer_phone, customer_note, \
                payment_authority, payment_ref_id, \
                created_at, confirmed_at, shipped_at, delivered_at, paid_at \
            ) VALUES (\
                $1::UUID, $2::VARCHAR, $3::UUID, $4::INT2, $5::INT2, \
                $6::NUMERIC, $7::NUMERIC, $8::NUMERIC, $9::NUMERIC, \
                $10::VARCHAR, $11::VARCHAR, $12::VARCHAR, $13::VARCHAR, \
                $14::VARCHAR, $15::VARCHAR, $16::VARCHAR, \
                $17::VARCHAR, $18::VARCHAR, \
                $19::TIMESTAMPTZ, $20::TIMESTAMPTZ, $21::TIMESTAMPTZ, \
                $22::TIMESTAMPTZ, $23::TIMESTAMPTZ \
            ) \
            ON CONFLICT (id) DO UPDATE \
            SET status = EXCLUDED.status, \
                payment_status = EXCLUDED.payment_status, \
                customer_note = EXCLUDED.customer_note, \
                payment_authority = EXCLUDED.payment_authority, \
                payment_ref_id = EXCLUDED.payment_ref_id, \
                confirmed_at = EXCLUDED.confirmed_at, \
                shipped_at = EXCLUDED.shipped_at, \
                delivered_at = EXCLUDED.delivered_at, \
                paid_at = EXCLUDED.paid_at";
        self.exec(
            SQL,
            &[
                &id,
                &number,
                &user_id,
                &status,
                &payment_status,
                &subtotal,
                &discount_amount,
                &shipping_cost,
                &total_amount,
                &province,
                &city,
                &street,
                &postal_code,
                &customer_name,
                &customer_phone,
                &customer_note,
                &payment_authority,
                &payment_ref_id,
                &created_at,
                &confirmed_at,
                &shipped_at,
                &delivered_at,
                &paid_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<Lock<By<Order, order::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Lock(by): Lock<By<Order, order::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: order::Id = by.into_inner();

        const SQL: &str = "\
            SELECT id \
            FROM orders \
            WHERE id = $1::UUID \
            FOR UPDATE";
        self.query(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}

impl<C> Database<Delete<By<Order, order::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<Order, order::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: order::Id = by.into_inner();

        // Items and history rows cascade.
        const SQL: &str = "\
            DELETE FROM orders \
            WHERE id = $1::UUID";
        self.exec(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}

impl<C> Database<Insert<order::Item>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(item): Insert<order::Item>,
    ) -> Result<Self::Ok, Self::Err> {
        let order::Item {
            order_id,
            product_id,
            product_name,
            product_sku,
            unit_price,
            quantity,
            discount_percent,
            discount_per_unit,
            line_subtotal,
            line_discount,
            line_total,
            created_at,
        } = item;

        let quantity = i32::try_from(quantity).expect("`quantity` overflow");

        const SQL: &str = "\
            INSERT INTO order_items (\
                order_id, product_id, product_name, product_sku, \
                unit_price, quantity, \
                discount_percent, discount_per_unit, \
                line_subtotal, line_discount, line_total, \
                created_at \
            ) VALUES (\
                $1::UUID, $2::UUID, $3::VARCHAR, $4::VARCHAR, \
                $5::NUMERIC, $6::INT4, \
                $7::NUMERIC, $8::NUMERIC, \
                $9::NUMERIC, $10::NUMERIC, $11::NUMERIC, \
                $12::TIMESTAMPTZ \
            )";
        self.exec(
            SQL,
            &[
                &order_id,
                &product_id,
                &product_name,
                &product_sku,
                &unit_price,
                &quantity,
                &discount_percent,
                &discount_per_unit,
                &line_subtotal,
                &line_discount,
                &line_total,
                &created_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<Select<By<Vec<order::Item>, order::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Vec<order::Item>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<order::Item>, order::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let order_id: order::Id = by.into_inner();

        const SQL: &str = "\
            SELECT order_id, product_id, product_name, product_sku, \
                   unit_price, quantity, \
                   discount_percent, discount_per_unit, \
                   line_subtotal, line_discount, line_total, \
                   created_at \
            FROM order_items \
            WHERE order_id = $1::UUID \
            ORDER BY product_id";
        Ok(self
            .query(SQL, &[&order_id])
            .await
            .map_err(tracerr::wrap!())?
            .into_iter()
            .map(|row| order::Item {
                order_id: row.get("order_id"),
                product_id: row.get("product_id"),
                product_name: row.get("product_name"),
                product_sku: row.get("product_sku"),
                unit_price: row.get("unit_price"),
                quantity: u32::try_from(row.get::<_, i32>("quantity"))
                    .expect("`quantity` overflow"),
                discount_percent: row.get("discount_percent"),
                discount_per_unit: row.get("discount_per_unit"),
                line_subtotal: row.get("line_subtotal"),
                line_discount: row.get("line_discount"),
                line_total: row.get("line_total"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

impl<C> Database<Insert<order::StatusHistory>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(entry): Insert<order::StatusHistory>,
    ) -> Result<Self::Ok, Self::Err> {
        let order::StatusHistory {
            order_id,
            previous_status,
            new_status,
            changed_by,
            note,
            created_at,
        } = entry;

        const SQL: &str = "\
            INSERT INTO order_status_history (\
                order_id, previous_status, new_status, \
                changed_by, note, created_at \
            ) VALUES (\
                $1::UUID, $2::INT2, $3::INT2, \
                $4::UUID, $5::VARCHAR, $6::TIMESTAMPTZ \
            )";
        self.exec(
            SQL,
            &[
                &order_id,
                &previous_status,
                &new_status,
                &changed_by,
                &note,
                &created_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<Select<By<Vec<order::StatusHistory>, order::Id>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = Vec<order::StatusHistory>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<order::StatusHistory>, order::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let order_id: order::Id = by.into_inner();

        const SQL: &str = "\
            SELECT order_id, previous_status, new_status, \
                   changed_by, note, created_at \
            FROM order_status_history \
            WHERE order_id = $1::UUID \
            ORDER BY created_at";
        Ok(self
            .query(SQL, &[&order_id])
            .await
            .map_err(tracerr::wrap!())?
            .into_iter()
            .map(|row| order::StatusHistory {
                order_id: row.get("order_id"),
                previous_status: row.get("previous_status"),
                new_status: row.get("new_status"),
                changed_by: row.get("changed_by"),
                note: row.get("note"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

impl<C> Database<Select<By<Option<read::order::WithItems>, order::Id>>>
    for Postgres<C>
where
    C: Connection,
    Self: Database<
            Select<By<Option<Order>, order::Id>>,
            Ok = Option<Order>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Vec<order::Item>, order::Id>>,
            Ok = Vec<order::Item>,
            Err = Traced<database::Error>,
        >,
{
    type Ok = Option<read::order::WithItems>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<read::order::WithItems>, order::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();

        let Some(order) = self
            .execute(Select(By::<Option<Order>, _>::new(id)))
            .await
            .map_err(tracerr::wrap!())?
        else {
            return Ok(None);
        };
        let items = self
            .execute(Select(By::<Vec<order::Item>, _>::new(id)))
            .await
            .map_err(tracerr::wrap!())?;

        Ok(Some(read::order::WithItems { order, items }))
    }
}

impl<C> Database<Select<By<Vec<order::Id>, read::order::UnpaidSince>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = Vec<order::Id>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<order::Id>, read::order::UnpaidSince>>,
    ) -> Result<Self::Ok, Self::Err> {
        let read::order::UnpaidSince(deadline) = by.into_inner();

        const SQL: &str = "\
            SELECT id \
            FROM orders \
            WHERE payment_status = $1::INT2 \
              AND status IN ($2::INT2, $3::INT2) \
              AND created_at < $4::TIMESTAMPTZ \
            ORDER BY created_at";
        Ok(self
            .query(
                SQL,
                &[
                    &order::PaymentStatus::Pending,
                    &order::Status::Pending,
                    &order::Status::Confirmed,
                    &deadline,
                ],
            )
            .await
            .map_err(tracerr::wrap!())?
            .into_iter()
            .map(|row| row.get("id"))
            .collect())
    }
}

impl<C>
    Database<Select<By<read::order::list::Page, read::order::list::Selector>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = read::order::list::Page;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<read::order::list::Page, read::order::list::Selector>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let read::order::list::Selector {
            arguments,
            filter: read::order::list::Filter { user_id, status },
        } = by.into_inner();

        let limit = i32::try_from(arguments.limit()).unwrap() + 1;

        let mut ps: Vec<&(dyn ToSql + Sync)> = vec![&limit];

        let cursor_idx = arguments.cursor().map(|c| {
            ps.push(c);
            ps.len()
        });
        let user_idx = user_id.as_ref().map(|u| {
            ps.push(u);
            ps.len()
        });
        let status_idx = status.as_ref().map(|s| {
            ps.push(s);
            ps.len()
        });

        let sql = format!(
            "SELECT id, status \
             FROM orders \
             WHERE true \
                   {cursor} \
                   {user_filtering} \
                   {status_filtering} \
             ORDER BY id {order} \
             LIMIT $1::INT4",
            cursor = cursor_idx.into_iter().format_with("", |idx, f| {
                let op = arguments.kind().operator();
                f(&format_args!("AND id {op} ${idx}::UUID"))
            }),
            order = arguments.kind().order().sql(),
            user_filtering = user_idx.into_iter().format_with("", |idx, f| {
                f(&format_args!("AND user_id = ${idx}::UUID"))
            }),
            status_filtering =
                status_idx.into_iter().format_with("", |idx, f| {
                    f(&format_args!("AND status = ${idx}::INT2"))
                }),
        );
        let rows = self
            .query(sql.as_str(), ps.as_slice())
            .await
            .map_err(tracerr::wrap!())?;

        let has_more = rows.len() > arguments.limit();
        let edges = rows
            .into_iter()
            .take(arguments.limit())
            .map(|row| {
                let id = row.get::<_, order::Id>("id");
                (id, (id, row.get::<_, order::Status>("status")))
            })
            .collect::<Vec<_>>();

        Ok(read::order::list::Page::new(&arguments, edges, has_more))
    }
}

impl<C> Database<Select<By<read::order::list::TotalCount, ()>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = read::order::list::TotalCount;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(_): Select<By<read::order::list::TotalCount, ()>>,
    ) -> Result<Self::Ok, Self::Err> {
        const SQL: &str = "\
            SELECT COUNT(*)::INT4 \
            FROM orders";
        self.query_opt(SQL, &[])
            .await
            .map_err(tracerr::wrap!())
            .map(|row| row.expect("always exists").get::<_, i32>(0).into())
    }
}
