/// Builds the CQL text for prepared statements. Values are always bound
/// through `?` markers; nothing caller-supplied is interpolated.
pub struct QueryBuilder;

impl QueryBuilder {
    /// Fully qualified table name
    pub fn table(keyspace: &str, table: &str) -> String {
        format!("{}.{}", keyspace, table)
    }

    /// Build a positional INSERT with one bind marker per column
    pub fn build_insert_query(keyspace: &str, table: &str, columns: &[&str]) -> String {
        let markers = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            Self::table(keyspace, table),
            columns.join(", "),
            markers
        )
    }

    /// Build a SELECT of the given columns, filtered by `column = ?` when `key` is set
    pub fn build_select_query(
        keyspace: &str,
        table: &str,
        columns: &[&str],
        key: Option<&str>,
    ) -> String {
        let mut query = format!("SELECT {} FROM {}", columns.join(", "), Self::table(keyspace, table));
        if let Some(key) = key {
            query.push_str(&format!(" WHERE {} = ?", key));
        }
        query
    }

    /// Append an ORDER BY clause on a clustering column
    pub fn order_by_desc(query: String, column: &str) -> String {
        format!("{} ORDER BY {} DESC", query, column)
    }

    /// Append a LIMIT clause
    pub fn limit(query: String, limit: u32) -> String {
        format!("{} LIMIT {}", query, limit)
    }
}
