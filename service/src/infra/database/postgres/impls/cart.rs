//! [`Cart`]-related [`Database`] implementations.

use common::operations::{By, Delete, Insert, Lock, Select, Update};
use tokio_postgres::Row;
use tracerr::Traced;

use crate::{
    domain::{cart, product, user, Cart, Product},
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
    read,
};

/// Maps the provided [`Row`] into a [`cart::Line`].
fn line_from_row(row: &Row) -> cart::Line {
    cart::Line {
        cart_id: row.get("cart_id"),
        product_id: row.get("product_id"),
        quantity: u32::try_from(row.get::<_, i32>("quantity"))
            .expect("`quantity` overflow"),
        price_at_add: row.get("price_at_add"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl<C> Database<Select<By<Option<Cart>, user::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Cart>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Cart>, user::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let user_id: user::Id = by.into_inner();

        const SQL: &str = "\
            SELECT id, user_id, created_at, updated_at \
            FROM carts \
            WHERE user_id = $1::UUID \
            LIMIT 1";
        Ok(self
            .query_opt(SQL, &[&user_id])
            .await
            .map_err(tracerr::wrap!())?
            .map(|row| Cart {
                id: row.get("id"),
                user_id: row.get("user_id"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            }))
    }
}

impl<C> Database<Insert<Cart>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(cart): Insert<Cart>,
    ) -> Result<Self::Ok, Self::Err> {
        let Cart {
            id,
            user_id,
            created_at,
            updated_at,
        } = cart;

        // One cart per user; a concurrent creation simply loses.
        const SQL: &str = "\
            INSERT INTO carts (id, user_id, created_at, updated_at) \
            VALUES ($1::UUID, $2::UUID, $3::TIMESTAMPTZ, $4::TIMESTAMPTZ) \
            ON CONFLICT (user_id) DO NOTHING";
        self.exec(SQL, &[&id, &user_id, &created_at, &updated_at])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}

impl<C> Database<Lock<By<Cart, cart::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Lock(by): Lock<By<Cart, cart::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: cart::Id = by.into_inner();

        const SQL: &str = "\
            SELECT id \
            FROM carts \
            WHERE id = $1::UUID \
            FOR UPDATE";
        self.query(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}

impl<C> Database<Select<By<Vec<cart::Line>, cart::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Vec<cart::Line>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<cart::Line>, cart::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let cart_id: cart::Id = by.into_inner();

        const SQL: &str = "\
            SELECT cart_id, product_id, quantity, price_at_add, \
                   created_at, updated_at \
            FROM cart_lines \
            WHERE cart_id = $1::UUID \
            ORDER BY created_at, product_id";
        Ok(self
            .query(SQL, &[&cart_id])
            .await
            .map_err(tracerr::wrap!())?
            .iter()
            .map(line_from_row)
            .collect())
    }
}

impl<C> Database<Select<By<Option<cart::Line>, (cart::Id, product::Id)>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<cart::Line>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<cart::Line>, (cart::Id, product::Id)>>,
    ) -> Result<Self::Ok, Self::Err> {
        let (cart_id, product_id) = by.into_inner();

        const SQL: &str = "\
            SELECT cart_id, product_id, quantity, price_at_add, \
                   created_at, updated_at \
            FROM cart_lines \
            WHERE cart_id = $1::UUID \
              AND product_id = $2::UUID \
            LIMIT 1";
        Ok(self
            .query_opt(SQL, &[&cart_id, &product_id])
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(line_from_row))
    }
}

impl<C> Database<Insert<cart::Line>> for Postgres<C>
where
    C: Connection,
    Self: Database<Update<cart::Line>, Ok = (), Err = Traced<database::Error>>,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(line): Insert<cart::Line>,
    ) -> Result<Self::Ok, Self::Err> {
        self.execute(Update(line)).await.map_err(tracerr::wrap!())
    }
}

impl<C> Database<Update<cart::Line>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(line): Update<cart::Line>,
    ) -> Result<Self::Ok, Self::Err> {
        let cart::Line {
            cart_id,
            product_id,
            quantity,
            price_at_add,
            created_at,
            updated_at,
        } = line;

        let quantity = i32::try_from(quantity).expect("`quantity` overflow");

        const SQL: &str = "\
            INSERT INTO cart_lines (\
                cart_id, product_id, quantity, price_at_add, \
                created_at, updated_at \
            ) VALUES (\
                $1::UUID, $2::UUID, $3::INT4, $4::NUMERIC, \
                $5::TIMESTAMPTZ, $6::TIMESTAMPTZ \
            ) \
            ON CONFLICT (cart_id, product_id) DO UPDATE \
            SET quantity = EXCLUDED.quantity, \
                updated_at = EXCLUDED.updated_at";
        self.exec(
            SQL,
            &[
                &cart_id,
                &product_id,
                &quantity,
                &price_at_add,
                &created_at,
                &updated_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<Delete<By<cart::Line, (cart::Id, product::Id)>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<cart::Line, (cart::Id, product::Id)>>,
    ) -> Result<Self::Ok, Self::Err> {
        let (cart_id, product_id) = by.into_inner();

        const SQL: &str = "\
            DELETE FROM cart_lines \
            WHERE cart_id = $1::UUID \
              AND product_id = $2::UUID";
        self.exec(SQL, &[&cart_id, &product_id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}

impl<C> Database<Delete<By<cart::Line, cart::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Delete(by): Delete<By<cart::Line, cart::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let cart_id: cart::Id = by.into_inner();

        const SQL: &str = "\
            DELETE FROM cart_lines \
            WHERE cart_id = $1::UUID";
        self.exec(SQL, &[&cart_id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}

impl<C> Database<Select<By<read::cart::Contents, user::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = read::cart::Contents;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<read::cart::Contents, user::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let user_id: user::Id = by.into_inner();

        // The inner join silently drops lines whose product vanished
        // from the catalog entirely.
        const SQL: &str = "\
            SELECT l.quantity AS line_quantity, l.price_at_add, \
                   p.id, p.name, p.sku, p.slug, \
                   p.unit_price, p.quantity, p.reorder_level, p.is_active, \
                   p.discount_percent, p.discount_per_unit, \
                   p.created_at \
            FROM carts c \
            JOIN cart_lines l ON l.cart_id = c.id \
            JOIN products p ON p.id = l.product_id \
            WHERE c.user_id = $1::UUID \
            ORDER BY l.created_at, l.product_id";
        Ok(read::cart::Contents {
            lines: self
                .query(SQL, &[&user_id])
                .await
                .map_err(tracerr::wrap!())?
                .into_iter()
                .map(|row| read::cart::Line {
                    product: Product {
                        id: row.get("id"),
                        name: row.get("name"),
                        sku: row.get("sku"),
                        slug: row.get("slug"),
                        unit_price: row.get("unit_price"),
                        quantity: u32::try_from(
                            row.get::<_, i32>("quantity"),
                        )
                        .expect("`quantity` overflow"),
                        reorder_level: u32::try_from(
                            row.get::<_, i32>("reorder_level"),
                        )
                        .expect("`reorder_level` overflow"),
                        is_active: row.get("is_active"),
                        discount_percent: row.get("discount_percent"),
                        discount_per_unit: row.get("discount_per_unit"),
                        created_at: row.get("created_at"),
                    },
                    quantity: u32::try_from(
                        row.get::<_, i32>("line_quantity"),
                    )
                    .expect("`quantity` overflow"),
                    price_at_add: row.get("price_at_add"),
                })
                .collect(),
        })
    }
}
