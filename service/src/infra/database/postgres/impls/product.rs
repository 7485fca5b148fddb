//! [`Product`]-related [`Database`] implementations.

use std::collections::HashMap;

use common::operations::{By, Insert, Lock, Select, Update};
use itertools::Itertools as _;
use postgres_types::ToSql;
use tracerr::Traced;

use crate::{
    domain::{product, stock, Product},
    infra::{
        database::{
            self,
            postgres::{Connection, FuzzPattern},
            Postgres,
        },
        Database,
    },
    read,
};

impl<C, IDs> Database<Select<By<HashMap<product::Id, Product>, IDs>>>
    for Postgres<C>
where
    C: Connection,
    IDs: AsRef<[product::Id]>,
{
    type Ok = HashMap<product::Id, Product>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<HashMap<product::Id, Product>, IDs>>,
    ) -> Result<Self::Ok, Self::Err> {
        let ids = by.into_inner();
        // Avoid subtle change for SQL.
        let ids: &[product::Id] = ids.as_ref();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let limit = i32::try_from(ids.len()).unwrap();

        const SQL: &str = "\
            SELECT id, name, sku, slug, \
                   unit_price, quantity, reorder_level, is_active, \
                   discount_percent, discount_per_unit, \
                   created_at \
            FROM products \
            WHERE id IN (SELECT unnest($1::UUID[]) LIMIT $2::INT4) \
            LIMIT $2::INT4";
        Ok(self
            .query(SQL, &[&ids, &limit])
            .await
            .map_err(tracerr::wrap!())?
            .into_iter()
            .map(|row| {
                let id = row.get("id");
                (
                    id,
                    Product {
                        id,
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
                )
            })
            .collect())
    }
}

impl<C> Database<Select<By<Option<Product>, product::Id>>> for Postgres<C>
where
    C: Connection,
    Self: Database<
        Select<By<HashMap<product::Id, Product>, [product::Id; 1]>>,
        Ok = HashMap<product::Id, Product>,
        Err = Traced<database::Error>,
    >,
{
    type Ok = Option<Product>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Product>, product::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        Ok(self
            .execute(Select(By::new([id])))
            .await
            .map_err(tracerr::wrap!())?
            .remove(&id))
    }
}

impl<C> Database<Select<By<Option<Product>, product::Slug>>> for Postgres<C>
where
    C: Connection,
    Self: Database<
        Select<By<Option<Product>, product::Id>>,
        Ok = Option<Product>,
        Err = Traced<database::Error>,
    >,
{
    type Ok = Option<Product>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Product>, product::Slug>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let slug: product::Slug = by.into_inner();

        const SQL: &str = "\
            SELECT id \
            FROM products \
            WHERE slug = $1::VARCHAR \
            LIMIT 1";
        let Some(row) = self
            .query_opt(SQL, &[&slug])
            .await
            .map_err(tracerr::wrap!())?
        else {
            return Ok(None);
        };

        self.execute(Select(By::new(row.get::<_, product::Id>("id"))))
            .await
            .map_err(tracerr::wrap!())
    }
}

impl<C> Database<Insert<Product>> for Postgres<C>
where
    C: Connection,
    Self: Database<Update<Product>, Ok = (), Err = Traced<database::Error>>,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(product): Insert<Product>,
    ) -> Result<Self::Ok, Self::Err> {
        self.execute(Update(product))
            .await
            .map_err(tracerr::wrap!())
    }
}

impl<C> Database<Update<Product>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(product): Update<Product>,
    ) -> Result<Self::Ok, Self::Err> {
        let Product {
            id,
            name,
            sku,
            slug,
            unit_price,
            quantity,
            reorder_level,
            is_active,
            discount_percent,
            discount_per_unit,
            created_at,
        } = product;

        let quantity = i32::try_from(quantity).expect("`quantity` overflow");
        let reorder_level =
            i32::try_from(reorder_level).expect("`reorder_level` overflow");

        const SQL: &str = "\
            INSERT INTO products (\
                id, name, sku, slug, \
                unit_price, quantity, reorder_level, is_active, \
                discount_percent, discount_per_unit, \
                created_at \
            ) VALUES (\
                $1::UUID, $2::VARCHAR, $3::VARCHAR, $4::VARCHAR, \
                $5::NUMERIC, $6::INT4, $7::INT4, $8::BOOL, \
                $9::NUMERIC, $10::NUMERIC, \
                $11::TIMESTAMPTZ \
            ) \
            ON CONFLICT (id) DO UPDATE \
            SET name = EXCLUDED.name, \
                sku = EXCLUDED.sku, \
                slug = EXCLUDED.slug, \
                unit_price = EXCLUDED.unit_price, \
                quantity = EXCLUDED.quantity, \
                reorder_level = EXCLUDED.reorder_level, \
                is_active = EXCLUDED.is_active, \
                discount_percent = EXCLUDED.discount_percent, \
                discount_per_unit = EXCLUDED.discount_per_unit, \
                created_at = EXCLUDED.created_at";
        self.exec(
            SQL,
            &[
                &id,
                &name,
                &sku,
                &slug,
                &unit_price,
                &quantity,
                &reorder_level,
                &is_active,
                &discount_percent,
                &discount_per_unit,
                &created_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<Lock<By<Product, product::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Lock(by): Lock<By<Product, product::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: product::Id = by.into_inner();

        const SQL: &str = "\
            SELECT id \
            FROM products \
            WHERE id = $1::UUID \
            FOR UPDATE";
        self.query(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}

impl<C> Database<Insert<stock::Movement>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(movement): Insert<stock::Movement>,
    ) -> Result<Self::Ok, Self::Err> {
        let stock::Movement {
            id,
            product_id,
            kind,
            quantity,
            before_quantity,
            after_quantity,
            note,
            created_by,
            created_at,
        } = movement;

        let before_quantity = i32::try_from(before_quantity)
            .expect("`before_quantity` overflow");
        let after_quantity =
            i32::try_from(after_quantity).expect("`after_quantity` overflow");

        const SQL: &str = "\
            INSERT INTO stock_movements (\
                id, product_id, kind, \
                quantity, before_quantity, after_quantity, \
                note, created_by, created_at \
            ) VALUES (\
                $1::UUID, $2::UUID, $3::INT2, \
                $4::INT4, $5::INT4, $6::INT4, \
                $7::VARCHAR, $8::UUID, $9::TIMESTAMPTZ \
            )";
        self.exec(
            SQL,
            &[
                &id,
                &product_id,
                &kind,
                &quantity,
                &before_quantity,
                &after_quantity,
                &note,
                &created_by,
                &created_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C>
    Database<
        Select<By<read::product::list::Page, read::product::list::Selector>>,
    > for Postgres<C>
where
    C: Connection,
{
    type Ok = read::product::list::Page;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<read::product::list::Page, read::product::list::Selector>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let read::product::list::Selector {
            arguments,
            filter:
                read::product::list::Filter {
                    name,
                    only_available,
                },
        } = by.into_inner();

        let limit = i32::try_from(arguments.limit()).unwrap() + 1;

        let mut ps: Vec<&(dyn ToSql + Sync)> = vec![&limit];

        let cursor_idx = arguments.cursor().map(|c| {
            ps.push(c);
            ps.len()
        });
        let name_idx = name.as_ref().map(|n| {
            ps.push(n);
            ps.len()
        });

        let name_pattern = name.as_ref().map(|n| FuzzPattern::new(n.as_ref()));
        let name_pattern_idx = name_pattern.as_ref().map(|n| {
            ps.push(n);
            ps.len()
        });

        let sql = format!(
            "SELECT id \
             FROM products \
             WHERE true \
                   {cursor} \
                   {name_filtering} \
                   {availability_filtering} \
             ORDER BY {name_ordering} \
                      id {order} \
             LIMIT $1::INT4",
            cursor = cursor_idx.into_iter().format_with("", |idx, f| {
                let op = arguments.kind().operator();
                f(&format_args!("AND id {op} ${idx}::UUID"))
            }),
            order = arguments.kind().order().sql(),
            name_filtering =
                name_pattern_idx.into_iter().format_with("", |idx, f| {
                    f(&format_args!(
                        "AND LOWER(name) SIMILAR TO LOWER(${idx}::VARCHAR)"
                    ))
                }),
            availability_filtering = if only_available {
                "AND is_active AND quantity > 0"
            } else {
                ""
            },
            name_ordering = name_idx.into_iter().format_with("", |idx, f| {
                let order = arguments.kind().order().sql();
                f(&format_args!(
                    "LEVENSHTEIN(name, ${idx}::VARCHAR, 1, 1, 0) {order},"
                ))
            })
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
                let id = row.get::<_, product::Id>("id");
                (id, id)
            })
            .collect::<Vec<_>>();

        Ok(read::product::list::Page::new(&arguments, edges, has_more))
    }
}

impl<C> Database<Select<By<read::product::list::TotalCount, ()>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = read::product::list::TotalCount;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(_): Select<By<read::product::list::TotalCount, ()>>,
    ) -> Result<Self::Ok, Self::Err> {
        const SQL: &str = "\
            SELECT COUNT(*)::INT4 \
            FROM products";
        self.query_opt(SQL, &[])
            .await
            .map_err(tracerr::wrap!())
            .map(|row| row.expect("always exists").get::<_, i32>(0).into())
    }
}
