use clap::Parser;

/// ANVIL SQLi – SQL injection detection and read-only extraction
#[derive(Parser, Debug)]
#[command(
    name = "anvil-sqli",
    version = "0.1.0",
    author = "Siddhant Bhattarai",
    about = "ANVIL SQLi – SQL injection detection and read-only extraction",
    long_about = r#"
ANVIL SQLi tests every parameter of a single HTTP request for SQL injection
and, once a parameter is confirmed, reads values back through the same channel.

DETECTION TECHNIQUES (in the order they run):
  • E  Error-based     database errors echo an injected expression
  • B  Boolean-blind   TRUE/FALSE conditions change the page
  • T  Time-based      TRUE conditions delay the response
  • U  UNION query     injected rows are rendered in the page

DIALECTS:
  MySQL/MariaDB, PostgreSQL, Microsoft SQL Server, Oracle, SQLite

Extraction is strictly read-only: no stacked writes, no file or OS access.
"#,
    after_help = r#"EXAMPLES:

Detection:
  anvil-sqli -t "https://example.com/item?id=1"
  anvil-sqli -t "https://example.com/item?id=1" -p id --technique EB
  anvil-sqli -t https://example.com/login --data "user=a&pass=b" --method POST

Enumeration:
  anvil-sqli -t "https://example.com/item?id=1" --banner --current-user
  anvil-sqli -t "https://example.com/item?id=1" --dbms mysql --dbs
  anvil-sqli -t "https://example.com/item?id=1" --columns -D shop -T users
  anvil-sqli -t "https://example.com/item?id=1" --sql-query "SELECT COUNT(*) FROM users"

Evasion:
  anvil-sqli -t "https://example.com/item?id=1" --tamper space2comment,randomcase

Reporting:
  anvil-sqli -t "https://example.com/item?id=1" --format json -o results.json"#
)]
pub struct Cli {
    /// Target URL (e.g. https://example.com/page.php?id=1)
    #[arg(short, long, required = true)]
    pub target: String,

    // ═══════════════════════════════════════════════════════════════════
    // INJECTION POINT
    // ═══════════════════════════════════════════════════════════════════
    /// Parameter(s) to test, comma separated (default: all discovered)
    #[arg(long, short = 'p', help_heading = "INJECTION")]
    pub param: Option<String>,

    /// Request body (form-urlencoded or JSON)
    #[arg(long, help_heading = "INJECTION")]
    pub data: Option<String>,

    /// HTTP method to use (GET, POST, ...)
    #[arg(long, default_value = "GET", help_heading = "INJECTION")]
    pub method: String,

    /// Content-Type of the request body (guessed from --data if omitted)
    #[arg(long = "content-type", help_heading = "INJECTION")]
    pub content_type: Option<String>,

    // ═══════════════════════════════════════════════════════════════════
    // DETECTION
    // ═══════════════════════════════════════════════════════════════════
    /// Techniques to use: B=Boolean, E=Error, U=Union, T=Time
    #[arg(long, default_value = "BEUT", help_heading = "DETECTION")]
    pub technique: String,

    /// Back-end DBMS, when already known (mysql, postgres, mssql, oracle, sqlite)
    #[arg(long, help_heading = "DETECTION")]
    pub dbms: Option<String>,

    /// Test every parameter even if the heuristic finds nothing
    #[arg(long = "force-test", help_heading = "DETECTION")]
    pub force_test: bool,

    /// Page similarity at or above which a response counts as TRUE
    #[arg(long, default_value_t = 0.95, help_heading = "DETECTION")]
    pub threshold: f64,

    /// Time-based: injected delay in seconds
    #[arg(long = "time-delay", default_value_t = 5, help_heading = "DETECTION")]
    pub time_delay: u64,

    /// Time-based: fraction of the delay a TRUE response must exceed
    #[arg(long = "time-tolerance", default_value_t = 0.7, help_heading = "DETECTION")]
    pub time_tolerance: f64,

    /// UNION: highest column count to probe
    #[arg(long = "union-cols", default_value_t = 20, help_heading = "DETECTION")]
    pub union_cols: usize,

    /// Comma-separated tamper scripts, applied in order
    #[arg(long, help_heading = "DETECTION")]
    pub tamper: Option<String>,

    /// List available tamper scripts and exit
    #[arg(long = "list-tampers", help_heading = "DETECTION")]
    pub list_tampers: bool,

    // ═══════════════════════════════════════════════════════════════════
    // DATABASE INFORMATION
    // ═══════════════════════════════════════════════════════════════════
    /// Retrieve DBMS banner/version
    #[arg(long, help_heading = "DB INFO")]
    pub banner: bool,

    /// Retrieve current user
    #[arg(long = "current-user", help_heading = "DB INFO")]
    pub current_user: bool,

    /// Retrieve current database
    #[arg(long = "current-db", help_heading = "DB INFO")]
    pub current_db: bool,

    /// Retrieve server hostname
    #[arg(long, help_heading = "DB INFO")]
    pub hostname: bool,

    /// Enumerate DBMS databases
    #[arg(long, help_heading = "DB INFO")]
    pub dbs: bool,

    /// Enumerate tables (use -D to specify database)
    #[arg(long, help_heading = "DB INFO")]
    pub tables: bool,

    /// Enumerate columns (use -D and -T to specify)
    #[arg(long, help_heading = "DB INFO")]
    pub columns: bool,

    /// Database to enumerate (defaults to the current one)
    #[arg(short = 'D', long = "database", help_heading = "DB INFO")]
    pub database: Option<String>,

    /// Table to enumerate
    #[arg(short = 'T', long = "table", help_heading = "DB INFO")]
    pub table: Option<String>,

    /// Evaluate a custom read-only SQL expression
    #[arg(long = "sql-query", help_heading = "DB INFO")]
    pub sql_query: Option<String>,

    // ═══════════════════════════════════════════════════════════════════
    // AUTHENTICATION
    // ═══════════════════════════════════════════════════════════════════
    /// Cookie string for authenticated scanning
    #[arg(long, help_heading = "AUTHENTICATION")]
    pub cookie: Option<String>,

    /// HTTP headers (can be used multiple times)
    #[arg(long = "header", short = 'H', help_heading = "AUTHENTICATION")]
    pub headers: Vec<String>,

    // ═══════════════════════════════════════════════════════════════════
    // PERFORMANCE
    // ═══════════════════════════════════════════════════════════════════
    /// Maximum HTTP requests per second (0 = unlimited)
    #[arg(long, default_value_t = 0, help_heading = "PERFORMANCE")]
    pub rate: u32,

    /// Concurrent detection workers
    #[arg(long, default_value_t = 10, help_heading = "PERFORMANCE")]
    pub threads: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30, help_heading = "PERFORMANCE")]
    pub timeout: u64,

    /// Route traffic through a proxy (e.g. http://127.0.0.1:8080)
    #[arg(long, help_heading = "PERFORMANCE")]
    pub proxy: Option<String>,

    // ═══════════════════════════════════════════════════════════════════
    // OUTPUT
    // ═══════════════════════════════════════════════════════════════════
    /// Output format (text, json)
    #[arg(long, default_value = "text", help_heading = "OUTPUT")]
    pub format: String,

    /// Write report to file
    #[arg(short, long, help_heading = "OUTPUT")]
    pub output: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, help_heading = "OUTPUT")]
    pub verbose: u8,

    /// Only print findings
    #[arg(short, long, help_heading = "OUTPUT")]
    pub quiet: bool,

    /// Do not print the banner
    #[arg(long = "no-banner", help_heading = "OUTPUT")]
    pub no_banner: bool,
}
