//! Statement text shared by the relational adapters.
//!
//! Tables are described once; adapters bind values in column order. The
//! first `key_len` columns of a table form its primary key, and the first
//! column of a child table references the root key.

/// Parameter syntax and limits of a SQL engine.
pub trait Dialect {
    /// Placeholder for the 1-based parameter `n`.
    fn placeholder(&self, n: usize) -> String;

    /// Largest number of bind parameters in one statement.
    fn max_params(&self) -> usize;

    /// Whether [`Dialect::key_set`] binds all keys as one array parameter.
    fn binds_arrays(&self) -> bool {
        false
    }

    /// Predicate matching `column` against `count` keys bound from `first`.
    fn key_set(&self, column: &str, first: usize, count: usize) -> String {
        format!("{column} IN ({})", self.placeholders(first, count))
    }

    /// `count` comma-separated placeholders starting at `first`.
    fn placeholders(&self, first: usize, count: usize) -> String {
        (first..first + count)
            .map(|n| self.placeholder(n))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// PostgreSQL: `$n` placeholders, key sets bound as arrays.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn placeholder(&self, n: usize) -> String {
        format!("${n}")
    }

    fn max_params(&self) -> usize {
        65_535
    }

    fn binds_arrays(&self) -> bool {
        true
    }

    fn key_set(&self, column: &str, first: usize, _count: usize) -> String {
        format!("{column} = ANY(${first})")
    }
}

/// SQLite: numbered `?n` placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn placeholder(&self, n: usize) -> String {
        format!("?{n}")
    }

    fn max_params(&self) -> usize {
        32_766
    }
}

/// A table and its column order.
#[derive(Debug, Clone, Copy)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub key_len: usize,
}

impl Table {
    pub fn column_list(&self) -> String {
        self.columns.join(", ")
    }

    fn key_columns(&self) -> &'static [&'static str] {
        &self.columns[..self.key_len]
    }

    /// Column referencing the root key.
    pub fn root_column(&self) -> &'static str {
        self.columns[0]
    }
}

pub const POST: Table = Table {
    name: "simple_post",
    columns: &["id", "title", "created"],
    key_len: 1,
};

pub const INVOICE: Table = Table {
    name: "standard_invoice",
    columns: &[
        "number", "total", "due_date", "paid", "reference", "tax", "version", "canceled",
    ],
    key_len: 1,
};

pub const ITEM: Table = Table {
    name: "standard_item",
    columns: &[
        "invoice_number",
        "position",
        "product",
        "cost",
        "quantity",
        "tax_group",
        "discount",
    ],
    key_len: 2,
};

pub const SCRAPE: Table = Table {
    name: "complex_bank_scrape",
    columns: &[
        "id",
        "website",
        "scraped_at",
        "info",
        "external_id",
        "ranking",
        "tags",
        "created_at",
    ],
    key_len: 1,
};

pub const ACCOUNT: Table = Table {
    name: "complex_account",
    columns: &["scrape_id", "position", "balance", "number", "name", "notes"],
    key_len: 2,
};

pub const TRANSACTION: Table = Table {
    name: "complex_transaction",
    columns: &[
        "scrape_id",
        "account_position",
        "position",
        "tran_date",
        "description",
        "currency",
        "amount",
    ],
    key_len: 3,
};

/// Root table, its ordering column and owned child tables, outermost first.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub root: Table,
    pub order: &'static str,
    pub children: &'static [Table],
}

pub const SIMPLE: Layout = Layout {
    root: POST,
    order: "created",
    children: &[],
};

pub const STANDARD: Layout = Layout {
    root: INVOICE,
    order: "version",
    children: &[ITEM],
};

pub const COMPLEX: Layout = Layout {
    root: SCRAPE,
    order: "created_at",
    children: &[ACCOUNT, TRANSACTION],
};

/// Which roots a read touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    All,
    /// Root key bound as `1`.
    Key,
    /// Root key among `n` keys bound from `1`.
    Keys(usize),
    /// Root ordering column between parameters `1` and `2`, inclusive.
    Window,
}

impl Layout {
    fn root_predicate(&self, d: &dyn Dialect, column: &str, filter: Filter) -> Option<String> {
        match filter {
            Filter::All => None,
            Filter::Key => Some(format!("{column} = {}", d.placeholder(1))),
            Filter::Keys(n) => Some(d.key_set(column, 1, n)),
            Filter::Window => Some(format!(
                "{column} IN (SELECT {} FROM {} WHERE {})",
                self.root.root_column(),
                self.root.name,
                self.window_predicate(d)
            )),
        }
    }

    fn window_predicate(&self, d: &dyn Dialect) -> String {
        format!(
            "{order} >= {} AND {order} <= {}",
            d.placeholder(1),
            d.placeholder(2),
            order = self.order
        )
    }

    /// Select root rows, ordered by key.
    pub fn select_roots(&self, d: &dyn Dialect, filter: Filter) -> String {
        let predicate = match filter {
            Filter::Window => Some(self.window_predicate(d)),
            other => self.root_predicate(d, self.root.root_column(), other),
        };
        select(&self.root, predicate)
    }

    /// Select rows of child table `level` for the filtered roots, ordered by
    /// parent and position.
    pub fn select_children(&self, d: &dyn Dialect, level: usize, filter: Filter) -> String {
        let table = &self.children[level];
        select(table, self.root_predicate(d, table.root_column(), filter))
    }

    /// Delete every row of the shape, innermost table first.
    pub fn delete_all(&self) -> Vec<String> {
        self.children
            .iter()
            .rev()
            .chain(std::iter::once(&self.root))
            .map(|table| format!("DELETE FROM {}", table.name))
            .collect()
    }

    /// One statement resolving all six report slots to `(slot, key, rank)`
    /// rows ordered by slot and rank.
    ///
    /// Parameters: `1` find-one key, `2..=5` find-many keys, `6` window
    /// start, `7` window end.
    pub fn report_keys(&self, d: &dyn Dialect) -> String {
        let table = self.root.name;
        let key = self.root.root_column();
        let order = self.order;
        let p = |n| d.placeholder(n);
        let from = p(6);
        let until = p(7);
        let inside = format!("{order} >= {from} AND {order} <= {until}");

        let branches = [
            format!("SELECT 0 AS slot, k, 0 AS rn FROM (SELECT {key} AS k FROM {table} WHERE {key} = {}) s0", p(1)),
            format!(
                "SELECT 1, k, ROW_NUMBER() OVER (ORDER BY k) FROM (SELECT {key} AS k FROM {table} WHERE {key} IN ({})) s1",
                d.placeholders(2, 4)
            ),
            format!(
                "SELECT 2, k, 0 FROM (SELECT {key} AS k FROM {table} WHERE {order} >= {from} ORDER BY {order}, {key} LIMIT 1) s2"
            ),
            format!(
                "SELECT 3, k, 0 FROM (SELECT {key} AS k FROM {table} WHERE {order} <= {until} ORDER BY {order} DESC, {key} DESC LIMIT 1) s3"
            ),
            format!(
                "SELECT 4, k, ROW_NUMBER() OVER (ORDER BY o, k) FROM (SELECT {key} AS k, {order} AS o FROM {table} WHERE {inside} ORDER BY {order}, {key} LIMIT {}) s4",
                crate::report::TOP_FIVE
            ),
            format!(
                "SELECT 5, k, ROW_NUMBER() OVER (ORDER BY o DESC, k DESC) FROM (SELECT {key} AS k, {order} AS o FROM {table} WHERE {inside} ORDER BY {order} DESC, {key} DESC LIMIT {}) s5",
                crate::report::LAST_TEN
            ),
        ];
        format!(
            "SELECT slot, k, rn FROM ({}) r ORDER BY slot, rn",
            branches.join(" UNION ALL ")
        )
    }
}

fn select(table: &Table, predicate: Option<String>) -> String {
    let mut sql = format!("SELECT {} FROM {}", table.column_list(), table.name);
    if let Some(predicate) = predicate {
        sql.push_str(" WHERE ");
        sql.push_str(&predicate);
    }
    sql.push_str(" ORDER BY ");
    sql.push_str(&table.key_columns().join(", "));
    sql
}

/// Rows that fit one multi-row insert into `table`.
pub fn rows_per_insert(d: &dyn Dialect, table: &Table) -> usize {
    (d.max_params() / table.columns.len()).max(1)
}

/// Multi-row insert of `rows` rows, parameters numbered row-major.
pub fn insert_rows(d: &dyn Dialect, table: &Table, rows: usize) -> String {
    let width = table.columns.len();
    let values = (0..rows)
        .map(|r| format!("({})", d.placeholders(r * width + 1, width)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table.name,
        table.column_list(),
        values
    )
}

/// Update of every non-key column; parameters follow column order.
pub fn update_row(d: &dyn Dialect, table: &Table) -> String {
    let set = table.columns[table.key_len..]
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = {}", d.placeholder(table.key_len + i + 1)))
        .collect::<Vec<_>>()
        .join(", ");
    let key = key_match(d, table.key_columns());
    format!("UPDATE {} SET {} WHERE {}", table.name, set, key)
}

/// Delete rows whose first `prefix` columns equal parameters `1..=prefix`
/// and whose next column is at least parameter `prefix + 1`.
pub fn truncate(d: &dyn Dialect, table: &Table, prefix: usize) -> String {
    format!(
        "DELETE FROM {} WHERE {} AND {} >= {}",
        table.name,
        key_match(d, &table.columns[..prefix]),
        table.columns[prefix],
        d.placeholder(prefix + 1)
    )
}

/// Count `child` rows per `parent` row for `n` root keys, including parents
/// without children. Yields the parent key columns followed by the count,
/// ordered by parent key.
pub fn count_children(d: &dyn Dialect, parent: &Table, child: &Table, n: usize) -> String {
    let parent_key = parent
        .key_columns()
        .iter()
        .map(|c| format!("p.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let join = parent
        .key_columns()
        .iter()
        .zip(child.columns)
        .map(|(p, c)| format!("c.{c} = p.{p}"))
        .collect::<Vec<_>>()
        .join(" AND ");
    let position = child.columns[child.key_len - 1];
    format!(
        "SELECT {parent_key}, COUNT(c.{position}) FROM {} p LEFT JOIN {} c ON {join} WHERE {} GROUP BY {parent_key} ORDER BY {parent_key}",
        parent.name,
        child.name,
        d.key_set(&format!("p.{}", parent.root_column()), 1, n),
    )
}

fn key_match(d: &dyn Dialect, columns: &[&str]) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = {}", d.placeholder(i + 1)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(Sqlite.placeholders(3, 3), "?3, ?4, ?5");
        assert_eq!(Postgres.placeholders(1, 2), "$1, $2");
        assert_eq!(Sqlite.key_set("id", 1, 2), "id IN (?1, ?2)");
        assert_eq!(Postgres.key_set("id", 1, 2), "id = ANY($1)");
    }

    #[test]
    fn test_insert_rows() {
        assert_eq!(
            insert_rows(&Postgres, &POST, 2),
            "INSERT INTO simple_post (id, title, created) VALUES ($1, $2, $3), ($4, $5, $6)"
        );
        assert_eq!(rows_per_insert(&Sqlite, &ITEM), 32_766 / 7);
    }

    #[test]
    fn test_update_row_uses_composite_key() {
        assert_eq!(
            update_row(&Sqlite, &ACCOUNT),
            "UPDATE complex_account SET balance = ?3, number = ?4, name = ?5, notes = ?6 \
             WHERE scrape_id = ?1 AND position = ?2"
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(
            truncate(&Postgres, &TRANSACTION, 2),
            "DELETE FROM complex_transaction WHERE scrape_id = $1 AND account_position = $2 AND position >= $3"
        );
        assert_eq!(
            truncate(&Postgres, &TRANSACTION, 1),
            "DELETE FROM complex_transaction WHERE scrape_id = $1 AND account_position >= $2"
        );
    }

    #[test]
    fn test_select_children_by_window() {
        assert_eq!(
            STANDARD.select_children(&Sqlite, 0, Filter::Window),
            "SELECT invoice_number, position, product, cost, quantity, tax_group, discount \
             FROM standard_item WHERE invoice_number IN \
             (SELECT number FROM standard_invoice WHERE version >= ?1 AND version <= ?2) \
             ORDER BY invoice_number, position"
        );
        assert_eq!(
            COMPLEX.select_roots(&Postgres, Filter::Key),
            "SELECT id, website, scraped_at, info, external_id, ranking, tags, created_at \
             FROM complex_bank_scrape WHERE id = $1 ORDER BY id"
        );
    }

    #[test]
    fn test_count_children() {
        assert_eq!(
            count_children(&Postgres, &ACCOUNT, &TRANSACTION, 3),
            "SELECT p.scrape_id, p.position, COUNT(c.position) FROM complex_account p \
             LEFT JOIN complex_transaction c ON c.scrape_id = p.scrape_id AND c.account_position = p.position \
             WHERE p.scrape_id = ANY($1) GROUP BY p.scrape_id, p.position ORDER BY p.scrape_id, p.position"
        );
    }

    #[test]
    fn test_delete_all_innermost_first() {
        assert_eq!(
            COMPLEX.delete_all(),
            vec![
                "DELETE FROM complex_transaction",
                "DELETE FROM complex_account",
                "DELETE FROM complex_bank_scrape",
            ]
        );
        assert_eq!(SIMPLE.delete_all(), vec!["DELETE FROM simple_post"]);
    }

    #[test]
    fn test_report_keys_shape() {
        let sql = SIMPLE.report_keys(&Sqlite);
        assert_eq!(sql.matches("UNION ALL").count(), 5);
        assert!(sql.contains("id IN (?2, ?3, ?4, ?5)"));
        assert!(sql.contains("LIMIT 5"));
        assert!(sql.contains("LIMIT 10"));
        assert!(sql.ends_with("ORDER BY slot, rn"));
    }
}
