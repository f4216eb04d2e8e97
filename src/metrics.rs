//! Observability hooks.
//!
//! With the `metrics` feature a process-wide [`METRICS`] instance records counters through the
//! global OpenTelemetry meter. With the `tracing` feature the [`tracing_helpers`] module opens
//! spans around query building, statement execution and relation loading.

#[cfg(feature = "metrics")]
pub use self::otel::{GraphMetrics, METRICS};

#[cfg(feature = "metrics")]
mod otel {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
    };

    pub static METRICS: Lazy<GraphMetrics> = Lazy::new(GraphMetrics::init);

    pub struct GraphMetrics {
        pub queries_built: Counter<u64>,
        pub statement_cache_hits: Counter<u64>,
        pub relation_loads: Counter<u64>,
        pub proxy_resolutions: Counter<u64>,
        pub query_duration: Histogram<f64>,
    }

    impl GraphMetrics {
        pub fn init() -> Self {
            let meter = global::meter("lifegraph");

            let queries_built = meter
                .u64_counter("lifegraph_queries_built_total")
                .with_description("Total statements built by object queries")
                .build();

            let statement_cache_hits = meter
                .u64_counter("lifegraph_statement_cache_hits_total")
                .with_description("Statements reused from the statement cache")
                .build();

            let relation_loads = meter
                .u64_counter("lifegraph_relation_loads_total")
                .with_description("Relation loads requested from the object loader")
                .build();

            let proxy_resolutions = meter
                .u64_counter("lifegraph_proxy_resolutions_total")
                .with_description("Proxies resolved to loaded nodes")
                .build();

            let query_duration = meter
                .f64_histogram("lifegraph_query_duration_seconds")
                .with_description("Duration of query execution including authorization")
                .build();

            Self {
                queries_built,
                statement_cache_hits,
                relation_loads,
                proxy_resolutions,
                query_duration,
            }
        }

        pub fn record_query_built(&self) {
            self.queries_built.add(1, &[]);
        }

        pub fn record_cache_hit(&self) {
            self.statement_cache_hits.add(1, &[]);
        }

        pub fn record_relation_load(&self) {
            self.relation_loads.add(1, &[]);
        }

        pub fn record_proxy_resolution(&self) {
            self.proxy_resolutions.add(1, &[]);
        }

        pub fn record_query_duration(&self, elapsed: std::time::Duration) {
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{debug_span, info_span, Span};

    pub fn build_query_span(root_type: &str) -> Span {
        info_span!("lifegraph.build_query", root_type = root_type)
    }

    pub fn execute_query_span(sql: &str) -> Span {
        info_span!("lifegraph.execute_query", sql = sql)
    }

    pub fn load_relation_span(role: &str, owners: usize) -> Span {
        debug_span!("lifegraph.load_relation", role = role, owners = owners)
    }

    pub fn resolve_span(oid: &str) -> Span {
        debug_span!("lifegraph.resolve", oid = oid)
    }

    pub fn parse_condition_span(root_type: &str, condition: &str) -> Span {
        debug_span!("lifegraph.parse_condition", root_type = root_type, condition = condition)
    }
}
