/// SQL DDL for the message board.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

/// Tables that must exist for the hub to run.
pub const REQUIRED_TABLES: &[&str] = &["topics", "messages", "topic_summaries", "agent_presence"];

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_id INTEGER NOT NULL REFERENCES topics(id),
    sender TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topic_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic_id INTEGER NOT NULL REFERENCES topics(id),
    summary_text TEXT NOT NULL,
    degraded INTEGER NOT NULL DEFAULT 0,
    covers_through INTEGER,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS agent_presence (
    name TEXT PRIMARY KEY,
    role TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'online',
    topic_id INTEGER,
    last_seen TEXT NOT NULL,
    last_read_at TEXT,
    last_read_id INTEGER
);

CREATE INDEX IF NOT EXISTS idx_messages_topic ON messages(topic_id, id);
CREATE INDEX IF NOT EXISTS idx_summaries_topic ON topic_summaries(topic_id, created_at);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
