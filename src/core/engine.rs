//! Scan pipeline
//!
//! Parameter discovery, baseline, heuristic pre-filter, DBMS identification,
//! technique dispatch and result aggregation. The [`Scanner`] holds no
//! per-scan state; every call to [`Scanner::scan`] builds its own result.

use crate::core::capability::Capability;
use crate::core::context::{EnumerationConfig, ScanConfig};
use crate::core::dispatcher::{Dispatcher, Job};
use crate::http::response::HttpResponse;
use crate::http::Transport;
use crate::reporting::model::{ScanResult, Severity, Vulnerability};
use crate::scanner::{
    BooleanFingerprinter, DbmsIdentifier, DbmsInfo, ErrorHeuristic, Fingerprinter,
    HeuristicDetector, ParameterParser, QueryStringParser, SignatureIdentifier,
};
use crate::sqli::core::dialect;
use crate::sqli::core::target::{Parameter, ScanTarget};
use crate::sqli::error::{Result, SqliError};
use crate::sqli::request::build_original;
use crate::sqli::techniques::{
    BooleanBlind, ErrorBased, ExtractionRequest, ExtractionResult, InjectionRequest, Technique,
    TimeBased, UnionBased,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Scanner {
    config: ScanConfig,
    transport: Arc<dyn Transport>,
    parser: Arc<dyn ParameterParser>,
    heuristic: Arc<dyn HeuristicDetector>,
    identifier: Arc<dyn DbmsIdentifier>,
    fingerprinter: Arc<dyn Fingerprinter>,
}

impl Scanner {
    /// Scanner wired with the default collaborators
    pub fn new(config: ScanConfig, transport: Arc<dyn Transport>) -> Self {
        let heuristic =
            ErrorHeuristic::new(transport.clone()).with_threshold(config.similarity_threshold);
        let fingerprinter = BooleanFingerprinter::new(config.similarity_threshold);
        Self {
            config,
            transport,
            parser: Arc::new(QueryStringParser),
            heuristic: Arc::new(heuristic),
            identifier: Arc::new(SignatureIdentifier),
            fingerprinter: Arc::new(fingerprinter),
        }
    }

    pub fn with_parser(mut self, parser: impl ParameterParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    pub fn with_heuristic(mut self, heuristic: impl HeuristicDetector + 'static) -> Self {
        self.heuristic = Arc::new(heuristic);
        self
    }

    pub fn with_identifier(mut self, identifier: impl DbmsIdentifier + 'static) -> Self {
        self.identifier = Arc::new(identifier);
        self
    }

    pub fn with_fingerprinter(mut self, fingerprinter: impl Fingerprinter + 'static) -> Self {
        self.fingerprinter = Arc::new(fingerprinter);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    fn build_technique(&self, capability: Capability) -> Arc<dyn Technique> {
        let c = &self.config;
        match capability {
            Capability::ErrorBased => Arc::new(ErrorBased::new(c.error_max_chunks)),
            Capability::BooleanBlind => Arc::new(BooleanBlind::new(c.similarity_threshold)),
            Capability::TimeBased => Arc::new(TimeBased::new(
                c.time_delay,
                c.time_tolerance,
                c.time_baseline_samples,
            )),
            Capability::UnionBased => Arc::new(UnionBased::new(
                c.union_length_ratio,
                c.union_max_columns,
                c.order_by_signatures.clone(),
            )),
        }
    }

    /// Enabled techniques in run order
    pub fn techniques(&self) -> Vec<Arc<dyn Technique>> {
        let mut techniques: Vec<_> = self
            .config
            .profile
            .enabled
            .iter()
            .map(|cap| self.build_technique(*cap))
            .collect();
        techniques.sort_by_key(|t| t.priority());
        techniques
    }

    async fn baseline(&self, cancel: &CancellationToken, target: &ScanTarget) -> Result<HttpResponse> {
        let request = build_original(target).map_err(SqliError::Baseline)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SqliError::Cancelled),
            resp = self.transport.execute(request) => resp.map_err(SqliError::Baseline),
        }
    }

    pub async fn scan(&self, cancel: &CancellationToken, mut target: ScanTarget) -> Result<ScanResult> {
        if cancel.is_cancelled() {
            return Err(SqliError::Cancelled);
        }

        tracing::info!("Starting SQL injection scan against {}", target.url);
        let mut errors = Vec::new();

        // -------------------------------------------------
        // Parameter discovery
        // -------------------------------------------------
        if target.parameters.is_empty() {
            match self.parser.parse(&target.url, &target.body, &target.content_type) {
                Ok(params) => target.parameters = params,
                Err(err) => {
                    tracing::warn!("parameter discovery failed: {}", err);
                    errors.push(format!("parameter discovery: {}", err));
                }
            }
        }

        if !self.config.parameters.is_empty() {
            for wanted in &self.config.parameters {
                if target.parameter(wanted).is_none() {
                    tracing::warn!("parameter '{}' not present in the request", wanted);
                }
            }
            target
                .parameters
                .retain(|p| self.config.parameters.contains(&p.name));
        }

        tracing::info!("Testing {} parameter(s)", target.parameters.len());

        let mut result = ScanResult::start(target.clone());
        result.errors = errors;

        // -------------------------------------------------
        // Baseline request (MANDATORY)
        // -------------------------------------------------
        let baseline = self.baseline(cancel, &target).await?;
        tracing::info!(
            "Baseline: status={} time={}ms size={}",
            baseline.status,
            baseline.elapsed.as_millis(),
            baseline.body_len
        );

        if target.parameters.is_empty() {
            tracing::warn!("No parameters to test");
            return Ok(self.finish(result));
        }

        // -------------------------------------------------
        // Heuristic pre-filter
        // -------------------------------------------------
        let mut baselines: HashMap<String, HttpResponse> = HashMap::new();
        let mut signatures: HashMap<String, Vec<String>> = HashMap::new();

        let candidates: Vec<Parameter> = if self.config.force_test {
            tracing::info!("Heuristic pre-filter skipped (force test)");
            target.parameters.clone()
        } else {
            match self.heuristic.detect(cancel, &target).await {
                Ok(verdicts) => {
                    let mut flagged = Vec::new();
                    for verdict in verdicts {
                        let name = verdict.parameter.name.clone();
                        if !verdict.signatures.is_empty() {
                            signatures.insert(name.clone(), verdict.signatures);
                        }
                        baselines.insert(name, verdict.baseline);
                        if verdict.injectable {
                            flagged.push(verdict.parameter);
                        }
                    }
                    tracing::info!(
                        "Heuristic flagged {}/{} parameter(s)",
                        flagged.len(),
                        target.parameters.len()
                    );
                    flagged
                }
                Err(SqliError::Cancelled) => return Err(SqliError::Cancelled),
                Err(err) => {
                    tracing::warn!("heuristic detection failed: {}", err);
                    result.errors.push(err.to_string());
                    target.parameters.clone()
                }
            }
        };

        if candidates.is_empty() {
            return Ok(self.finish(result));
        }

        // -------------------------------------------------
        // DBMS identification
        // -------------------------------------------------
        let identified = self
            .identify(cancel, &target, &candidates, &baseline, &baselines, &signatures, &mut result)
            .await?;
        let dbms = identified
            .as_ref()
            .map(|info| info.name().to_string())
            .unwrap_or_default();
        if let Some(info) = &identified {
            tracing::info!("Backend DBMS: {} ({})", info.name(), info.source);
            result.dbms = dbms.clone();
            result.dbms_version = info.version.clone();
        }

        // -------------------------------------------------
        // Technique dispatch
        // -------------------------------------------------
        let techniques = self.techniques();
        if self.config.profile.enabled.iter().any(Capability::is_slow) {
            tracing::info!(
                "Time-based checks enabled, each delayed probe costs {}s",
                self.config.time_delay
            );
        }
        let shared = Arc::new(target);
        let mut jobs = Vec::with_capacity(candidates.len() * techniques.len());
        for parameter in candidates {
            let request = Arc::new(InjectionRequest {
                target: shared.clone(),
                baseline: baselines
                    .get(&parameter.name)
                    .cloned()
                    .unwrap_or_else(|| baseline.clone()),
                parameter,
                dbms: dbms.clone(),
                transport: self.transport.clone(),
            });
            for technique in &techniques {
                jobs.push(Job {
                    request: request.clone(),
                    technique: technique.clone(),
                });
            }
        }

        tracing::info!(
            "Dispatching {} job(s) over {} worker(s)",
            jobs.len(),
            self.config.threads
        );
        let report = Dispatcher::new(self.config.threads).run(cancel, jobs).await?;
        result.errors.extend(report.errors);

        // -------------------------------------------------
        // Aggregation
        // -------------------------------------------------
        for detection in report.detections {
            let found = detection.result;
            if !found.injectable {
                continue;
            }
            let vuln_dbms = if found.dbms.is_empty() {
                dbms.clone()
            } else {
                found.dbms
            };
            result.vulnerabilities.push(Vulnerability {
                parameter: detection.request.parameter.clone(),
                technique: found.technique.to_string(),
                priority: detection.technique.priority(),
                dbms: vuln_dbms,
                payload: found.payload,
                confidence: found.confidence,
                severity: Severity::from_confidence(found.confidence),
                evidence: found.evidence,
                injectable: true,
            });
        }
        result.vulnerabilities.sort_by(|a, b| {
            a.parameter
                .name
                .cmp(&b.parameter.name)
                .then(a.priority.cmp(&b.priority))
        });

        if result.dbms.is_empty() {
            if let Some(best) = result.best_finding().map(|v| v.dbms.clone()) {
                result.dbms = best;
            }
        }

        Ok(self.finish(result))
    }

    /// Hint first, then error signatures, then active fingerprinting
    #[allow(clippy::too_many_arguments)]
    async fn identify(
        &self,
        cancel: &CancellationToken,
        target: &ScanTarget,
        candidates: &[Parameter],
        baseline: &HttpResponse,
        baselines: &HashMap<String, HttpResponse>,
        signatures: &HashMap<String, Vec<String>>,
        result: &mut ScanResult,
    ) -> Result<Option<DbmsInfo>> {
        if !self.config.dbms.is_empty() {
            match dialect::lookup(&self.config.dbms) {
                Some(hinted) => return Ok(Some(DbmsInfo::new(hinted.dbms(), "user hint"))),
                None => {
                    let err = SqliError::UnknownDialect(self.config.dbms.clone());
                    tracing::warn!("{}, identifying the backend instead", err);
                    result.errors.push(err.to_string());
                }
            }
        }

        if let Some(info) = self.identifier.identify(signatures) {
            return Ok(Some(info));
        }

        let Some(first) = candidates.first() else {
            return Ok(None);
        };
        let param_baseline = baselines.get(&first.name).unwrap_or(baseline);

        match self
            .fingerprinter
            .fingerprint(cancel, target, first, param_baseline, self.transport.as_ref())
            .await
        {
            Ok(info) => Ok(info),
            Err(SqliError::Cancelled) => Err(SqliError::Cancelled),
            Err(err) => {
                let err = match err {
                    SqliError::Fingerprint(_) => err,
                    other => SqliError::Fingerprint(format!("{} on {}", other, first.name)),
                };
                tracing::warn!("{}", err);
                result.errors.push(err.to_string());
                Ok(None)
            }
        }
    }

    fn finish(&self, mut result: ScanResult) -> ScanResult {
        result.finished_at = Some(Utc::now());
        result.total_requests = self.transport.stats().total_requests;
        tracing::info!(
            "Scan finished: {} finding(s), {} request(s)",
            result.vulnerabilities.len(),
            result.total_requests
        );
        result
    }

    // -------------------------------------------------
    // Extraction
    // -------------------------------------------------

    /// Evaluate `query` through the channel `finding` was confirmed on
    pub async fn extract(
        &self,
        cancel: &CancellationToken,
        target: &ScanTarget,
        finding: &Vulnerability,
        query: &str,
    ) -> Result<ExtractionResult> {
        let technique = [
            Capability::ErrorBased,
            Capability::BooleanBlind,
            Capability::TimeBased,
            Capability::UnionBased,
        ]
        .into_iter()
        .map(|cap| self.build_technique(cap))
        .find(|t| t.name() == finding.technique)
        .ok_or_else(|| SqliError::NotInjectable(format!("unknown technique {}", finding.technique)))?;

        let baseline = self.baseline(cancel, target).await?;
        let request = ExtractionRequest {
            injection: InjectionRequest {
                target: Arc::new(target.clone()),
                parameter: finding.parameter.clone(),
                baseline,
                dbms: finding.dbms.clone(),
                transport: self.transport.clone(),
            },
            query: query.to_string(),
        };

        tracing::debug!(param = %finding.parameter.name, "extracting {} via {}", query, technique.name());
        technique.extract(cancel, &request).await
    }

    /// Run the requested read-only queries through the best finding
    pub async fn enumerate(
        &self,
        cancel: &CancellationToken,
        result: &ScanResult,
        enumeration: &EnumerationConfig,
    ) -> Result<Vec<(String, ExtractionResult)>> {
        let finding = result.best_finding().ok_or_else(|| {
            SqliError::NotInjectable("no injectable parameter to extract through".to_string())
        })?;
        let dialect = dialect::resolve(&finding.dbms);

        let mut queries: Vec<(&str, String)> = Vec::new();
        if enumeration.banner {
            queries.push(("banner", dialect.version_query().to_string()));
        }
        if enumeration.current_user {
            queries.push(("current user", dialect.current_user_query().to_string()));
        }
        if enumeration.current_db {
            queries.push(("current database", dialect.current_db_query().to_string()));
        }
        if enumeration.hostname {
            queries.push(("hostname", dialect.hostname_query().to_string()));
        }
        if enumeration.dbs {
            queries.push(("databases", dialect.databases_query()));
        }
        if let Some(sql) = &enumeration.sql_query {
            queries.push(("query", sql.clone()));
        }

        tracing::info!(
            "Extracting through {} on parameter '{}'",
            finding.technique,
            finding.parameter.name
        );

        let mut values = Vec::with_capacity(queries.len());
        for (label, query) in queries {
            let extracted = self.extract_labelled(cancel, result, finding, label, &query).await?;
            values.push((label.to_string(), extracted));
        }

        if enumeration.tables || enumeration.columns {
            let database = match &enumeration.database {
                Some(db) => db.clone(),
                None => match values.iter().find(|(label, _)| label == "current database") {
                    Some((_, known)) => known.value.clone(),
                    None => {
                        self.extract_labelled(
                            cancel,
                            result,
                            finding,
                            "current database",
                            dialect.current_db_query(),
                        )
                        .await?
                        .value
                    }
                },
            };

            if enumeration.tables {
                let extracted = if database.is_empty() {
                    missing("database name unknown, pass -D")
                } else {
                    self.extract_labelled(cancel, result, finding, "tables", &dialect.tables_query(&database))
                        .await?
                };
                values.push((format!("tables in {}", database), extracted));
            }

            if enumeration.columns {
                let extracted = match enumeration.table.as_deref() {
                    None => missing("no table given, pass -T"),
                    Some(_) if database.is_empty() => missing("database name unknown, pass -D"),
                    Some(table) => {
                        let query = dialect.columns_query(&database, table);
                        self.extract_labelled(cancel, result, finding, "columns", &query).await?
                    }
                };
                let table = enumeration.table.as_deref().unwrap_or("?");
                values.push((format!("columns in {}.{}", database, table), extracted));
            }
        }

        Ok(values)
    }

    /// Extract one value, turning non-fatal failures into an empty partial result
    async fn extract_labelled(
        &self,
        cancel: &CancellationToken,
        result: &ScanResult,
        finding: &Vulnerability,
        label: &str,
        query: &str,
    ) -> Result<ExtractionResult> {
        let extracted = match self.extract(cancel, &result.target, finding, query).await {
            Ok(extracted) => extracted,
            Err(SqliError::Cancelled) => return Err(SqliError::Cancelled),
            Err(err) => {
                tracing::warn!("{} extraction failed: {}", label, err);
                failed(err)
            }
        };
        if extracted.partial {
            tracing::warn!("{} is incomplete after {} request(s)", label, extracted.requests);
        }
        Ok(extracted)
    }
}

fn failed(err: SqliError) -> ExtractionResult {
    ExtractionResult {
        error: Some(err),
        partial: true,
        ..ExtractionResult::default()
    }
}

fn missing(reason: &str) -> ExtractionResult {
    failed(SqliError::NotInjectable(reason.to_string()))
}
