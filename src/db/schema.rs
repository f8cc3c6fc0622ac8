pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- headlines table
CREATE TABLE IF NOT EXISTS headlines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    headline TEXT NOT NULL,
    origin TEXT NOT NULL DEFAULT 'manual',
    status TEXT NOT NULL DEFAULT 'pending',
    priority INTEGER NOT NULL DEFAULT 5,
    category TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    processed_at TEXT,
    notes TEXT
);

CREATE INDEX IF NOT EXISTS idx_headlines_status ON headlines(status);
CREATE INDEX IF NOT EXISTS idx_headlines_created_at ON headlines(created_at);

-- research table
CREATE TABLE IF NOT EXISTS research (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    headline_id INTEGER NOT NULL REFERENCES headlines(id) ON DELETE CASCADE,
    query TEXT NOT NULL,
    response TEXT NOT NULL,
    sources_json TEXT NOT NULL,
    quality_score INTEGER,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_research_headline_id ON research(headline_id);

-- articles table
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    headline_id INTEGER NOT NULL REFERENCES headlines(id) ON DELETE CASCADE,
    research_id INTEGER NOT NULL REFERENCES research(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    llm_used TEXT NOT NULL,
    quality_score INTEGER,
    status TEXT NOT NULL DEFAULT 'draft',
    external_id INTEGER,
    reviewer TEXT,
    reviewer_notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    reviewed_at TEXT,
    published_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_articles_headline_id ON articles(headline_id);
CREATE INDEX IF NOT EXISTS idx_articles_status ON articles(status);

-- sources table (global, deduplicated by url)
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    domain TEXT NOT NULL,
    title TEXT,
    credibility_score INTEGER NOT NULL DEFAULT 5,
    last_verified TEXT,
    times_cited INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_sources_domain ON sources(domain);

-- logs table (append only)
CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    headline_id INTEGER,
    process_type TEXT NOT NULL,
    status TEXT NOT NULL,
    message TEXT,
    execution_time REAL,
    tokens_used INTEGER,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_logs_headline_id ON logs(headline_id);
CREATE INDEX IF NOT EXISTS idx_logs_created_at ON logs(created_at);
"#;
