//! Idempotent DDL for the colony store (spec 6.3). Executed in dependency
//! order inside one transaction by [`super::Store::open`]; every statement
//! is `IF NOT EXISTS` so repeated calls across process restarts are free.

/// Tables, indexes and sequences, in an order that respects foreign keys.
pub const STATEMENTS: &[&str] = &[
    // --- sequences backing surrogate keys -----------------------------
    "CREATE SEQUENCE IF NOT EXISTS profile_frame_dictionary_frame_id_seq",
    "CREATE SEQUENCE IF NOT EXISTS sequence_gaps_id_seq",
    "CREATE SEQUENCE IF NOT EXISTS debug_events_id_seq",
    // --- service registry-adjacent tables -----------------------------
    "CREATE TABLE IF NOT EXISTS services (
        id              TEXT PRIMARY KEY,
        name            TEXT NOT NULL,
        app_id          TEXT,
        version         TEXT,
        agent_id        TEXT NOT NULL,
        labels          JSONB NOT NULL DEFAULT '{}',
        status          TEXT NOT NULL DEFAULT 'active',
        registered_at   TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS idx_services_agent ON services(agent_id)",
    "CREATE TABLE IF NOT EXISTS service_heartbeats (
        service_id  TEXT PRIMARY KEY REFERENCES services(id),
        last_seen   TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS service_connections (
        from_service        TEXT NOT NULL,
        to_service          TEXT NOT NULL,
        protocol            TEXT NOT NULL,
        first_observed       TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_observed        TIMESTAMPTZ NOT NULL DEFAULT now(),
        connection_count    BIGINT NOT NULL DEFAULT 0,
        PRIMARY KEY (from_service, to_service, protocol)
    )",
    "CREATE TABLE IF NOT EXISTS agent_ip_allocations (
        agent_id        TEXT PRIMARY KEY,
        ip_address      TEXT NOT NULL UNIQUE,
        allocated_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_seen       TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    // --- RED metrics ---------------------------------------------------
    "CREATE TABLE IF NOT EXISTS beyla_http_metrics (
        timestamp_bucket    TIMESTAMPTZ NOT NULL,
        agent_id            TEXT NOT NULL,
        service_name        TEXT NOT NULL,
        http_method         TEXT NOT NULL,
        http_route          TEXT NOT NULL,
        http_status_code    INTEGER NOT NULL,
        latency_bucket_ms   DOUBLE PRECISION NOT NULL,
        count               BIGINT NOT NULL,
        attributes          JSONB NOT NULL DEFAULT '{}',
        PRIMARY KEY (timestamp_bucket, agent_id, service_name, http_method, http_route, http_status_code, latency_bucket_ms)
    )",
    "CREATE INDEX IF NOT EXISTS idx_beyla_http_service_time ON beyla_http_metrics(service_name, timestamp_bucket)",
    "CREATE INDEX IF NOT EXISTS idx_beyla_http_agent_time ON beyla_http_metrics(agent_id, timestamp_bucket)",
    "CREATE INDEX IF NOT EXISTS idx_beyla_http_route_time ON beyla_http_metrics(http_route, timestamp_bucket)",
    "CREATE TABLE IF NOT EXISTS beyla_grpc_metrics (
        timestamp_bucket    TIMESTAMPTZ NOT NULL,
        agent_id            TEXT NOT NULL,
        service_name        TEXT NOT NULL,
        grpc_method         TEXT NOT NULL,
        grpc_status_code    INTEGER NOT NULL,
        latency_bucket_ms   DOUBLE PRECISION NOT NULL,
        count               BIGINT NOT NULL,
        attributes          JSONB NOT NULL DEFAULT '{}',
        PRIMARY KEY (timestamp_bucket, agent_id, service_name, grpc_method, grpc_status_code, latency_bucket_ms)
    )",
    "CREATE INDEX IF NOT EXISTS idx_beyla_grpc_service_time ON beyla_grpc_metrics(service_name, timestamp_bucket)",
    "CREATE INDEX IF NOT EXISTS idx_beyla_grpc_agent_time ON beyla_grpc_metrics(agent_id, timestamp_bucket)",
    "CREATE TABLE IF NOT EXISTS beyla_sql_metrics (
        timestamp_bucket    TIMESTAMPTZ NOT NULL,
        agent_id            TEXT NOT NULL,
        service_name        TEXT NOT NULL,
        sql_operation       TEXT NOT NULL,
        table_name          TEXT NOT NULL,
        latency_bucket_ms   DOUBLE PRECISION NOT NULL,
        count               BIGINT NOT NULL,
        attributes          JSONB NOT NULL DEFAULT '{}',
        PRIMARY KEY (timestamp_bucket, agent_id, service_name, sql_operation, table_name, latency_bucket_ms)
    )",
    "CREATE INDEX IF NOT EXISTS idx_beyla_sql_service_time ON beyla_sql_metrics(service_name, timestamp_bucket)",
    "CREATE INDEX IF NOT EXISTS idx_beyla_sql_agent_time ON beyla_sql_metrics(agent_id, timestamp_bucket)",
    // --- traces ----------------------------------------------------
    "CREATE TABLE IF NOT EXISTS beyla_traces (
        trace_id            TEXT NOT NULL,
        span_id             TEXT NOT NULL,
        parent_span_id      TEXT,
        agent_id            TEXT NOT NULL,
        service_name        TEXT NOT NULL,
        span_name           TEXT NOT NULL,
        span_kind           TEXT NOT NULL,
        start_time          TIMESTAMPTZ NOT NULL,
        duration_us         BIGINT NOT NULL,
        status_code         TEXT NOT NULL,
        attributes          JSONB NOT NULL DEFAULT '{}',
        PRIMARY KEY (trace_id, span_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_beyla_traces_service_start ON beyla_traces(service_name, start_time)",
    "CREATE INDEX IF NOT EXISTS idx_beyla_traces_trace_start ON beyla_traces(trace_id, start_time)",
    "CREATE INDEX IF NOT EXISTS idx_beyla_traces_duration ON beyla_traces(duration_us)",
    "CREATE INDEX IF NOT EXISTS idx_beyla_traces_agent_start ON beyla_traces(agent_id, start_time)",
    // --- OTEL span summaries ------------------------------------------
    "CREATE TABLE IF NOT EXISTS otel_summaries (
        bucket_time     TIMESTAMPTZ NOT NULL,
        agent_id        TEXT NOT NULL,
        service_name    TEXT NOT NULL,
        span_kind       TEXT NOT NULL,
        p50_ms          DOUBLE PRECISION NOT NULL,
        p95_ms          DOUBLE PRECISION NOT NULL,
        p99_ms          DOUBLE PRECISION NOT NULL,
        error_count     BIGINT NOT NULL,
        total_spans     BIGINT NOT NULL,
        sample_traces   TEXT[] NOT NULL DEFAULT '{}',
        created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (bucket_time, agent_id, service_name, span_kind)
    )",
    "CREATE INDEX IF NOT EXISTS idx_otel_summaries_service_time ON otel_summaries(service_name, bucket_time)",
    // --- profiles ----------------------------------------------------
    "CREATE TABLE IF NOT EXISTS cpu_profile_summaries (
        bucket_time         TIMESTAMPTZ NOT NULL,
        agent_id            TEXT NOT NULL,
        service_name        TEXT NOT NULL,
        build_id            TEXT NOT NULL,
        stack_hash          TEXT NOT NULL,
        stack_frame_ids     BIGINT[] NOT NULL,
        sample_count        BIGINT NOT NULL,
        PRIMARY KEY (bucket_time, agent_id, service_name, build_id, stack_hash)
    )",
    "CREATE INDEX IF NOT EXISTS idx_cpu_profile_service ON cpu_profile_summaries(service_name)",
    "CREATE INDEX IF NOT EXISTS idx_cpu_profile_build ON cpu_profile_summaries(build_id)",
    "CREATE TABLE IF NOT EXISTS memory_profile_summaries (
        bucket_time         TIMESTAMPTZ NOT NULL,
        agent_id            TEXT NOT NULL,
        service_name        TEXT NOT NULL,
        build_id            TEXT NOT NULL,
        stack_hash          TEXT NOT NULL,
        stack_frame_ids     BIGINT[] NOT NULL,
        alloc_bytes         BIGINT NOT NULL,
        alloc_objects       BIGINT NOT NULL,
        PRIMARY KEY (bucket_time, agent_id, service_name, build_id, stack_hash)
    )",
    "CREATE INDEX IF NOT EXISTS idx_memory_profile_service ON memory_profile_summaries(service_name)",
    "CREATE INDEX IF NOT EXISTS idx_memory_profile_build ON memory_profile_summaries(build_id)",
    "CREATE TABLE IF NOT EXISTS binary_metadata_registry (
        build_id            TEXT PRIMARY KEY,
        service_name        TEXT NOT NULL,
        binary_path         TEXT NOT NULL,
        first_seen          TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_seen           TIMESTAMPTZ NOT NULL DEFAULT now(),
        has_debug_info      BOOLEAN NOT NULL DEFAULT false
    )",
    "CREATE TABLE IF NOT EXISTS profile_frame_dictionary (
        frame_id    BIGINT PRIMARY KEY DEFAULT nextval('profile_frame_dictionary_frame_id_seq'),
        frame_name  TEXT NOT NULL UNIQUE
    )",
    "CREATE INDEX IF NOT EXISTS idx_frame_dictionary_name ON profile_frame_dictionary(frame_name)",
    // --- system metrics -------------------------------------------------
    "CREATE TABLE IF NOT EXISTS system_metrics_summaries (
        bucket_time     TIMESTAMPTZ NOT NULL,
        agent_id        TEXT NOT NULL,
        metric_name     TEXT NOT NULL,
        attributes_json TEXT NOT NULL DEFAULT '{}',
        min_value       DOUBLE PRECISION NOT NULL,
        max_value       DOUBLE PRECISION NOT NULL,
        avg_value       DOUBLE PRECISION NOT NULL,
        p95_value       DOUBLE PRECISION NOT NULL,
        delta_value     DOUBLE PRECISION NOT NULL,
        sample_count    BIGINT NOT NULL,
        unit            TEXT NOT NULL,
        metric_type     TEXT NOT NULL,
        PRIMARY KEY (bucket_time, agent_id, metric_name, attributes_json)
    )",
    "CREATE INDEX IF NOT EXISTS idx_system_metrics_agent_time ON system_metrics_summaries(agent_id, bucket_time)",
    // --- checkpoints & gaps ---------------------------------------------
    "CREATE TABLE IF NOT EXISTS polling_checkpoints (
        agent_id        TEXT NOT NULL,
        data_type       TEXT NOT NULL,
        session_id      TEXT NOT NULL,
        last_seq_id     BIGINT NOT NULL,
        last_poll_time  TIMESTAMPTZ NOT NULL DEFAULT now(),
        created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (agent_id, data_type)
    )",
    "CREATE TABLE IF NOT EXISTS sequence_gaps (
        id                      BIGINT PRIMARY KEY DEFAULT nextval('sequence_gaps_id_seq'),
        agent_id                TEXT NOT NULL,
        data_type               TEXT NOT NULL,
        start_seq_id            BIGINT NOT NULL,
        end_seq_id              BIGINT NOT NULL,
        detected_at             TIMESTAMPTZ NOT NULL DEFAULT now(),
        recovered_at            TIMESTAMPTZ,
        status                  TEXT NOT NULL DEFAULT 'detected',
        recovery_attempts       INTEGER NOT NULL DEFAULT 0,
        last_recovery_attempt   TIMESTAMPTZ
    )",
    "CREATE INDEX IF NOT EXISTS idx_sequence_gaps_status ON sequence_gaps(status, detected_at)",
    "CREATE INDEX IF NOT EXISTS idx_sequence_gaps_agent_type ON sequence_gaps(agent_id, data_type)",
    // --- remote function debug sessions (schema parity only; no poller
    //     in this crate drives these rows, see DESIGN.md) ----------------
    "CREATE TABLE IF NOT EXISTS debug_sessions (
        session_id      TEXT PRIMARY KEY,
        collector_id    TEXT NOT NULL,
        service_name    TEXT NOT NULL,
        function_name   TEXT NOT NULL,
        agent_id        TEXT NOT NULL,
        sdk_addr        TEXT,
        started_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
        expires_at      TIMESTAMPTZ NOT NULL,
        status          TEXT NOT NULL DEFAULT 'active',
        requested_by    TEXT,
        event_count     BIGINT NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS debug_events (
        id              BIGINT PRIMARY KEY DEFAULT nextval('debug_events_id_seq'),
        session_id      TEXT NOT NULL REFERENCES debug_sessions(session_id),
        timestamp       TIMESTAMPTZ NOT NULL DEFAULT now(),
        args            JSONB,
        return_value    JSONB,
        labels          JSONB NOT NULL DEFAULT '{}'
    )",
];

/// Statement attempted after the core schema; failure here is logged, not
/// fatal (spec 4.1, 9's vector-index Open Question). pgvector may simply
/// not be installed on the target database.
pub const VECTOR_INDEX_STATEMENT: &str =
    "CREATE EXTENSION IF NOT EXISTS vector";
