//! SQLite schema

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS calendars (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(name) > 0),
    date_time TEXT NOT NULL,
    all_day INTEGER NOT NULL DEFAULT 0,
    timezone TEXT NOT NULL,
    location TEXT,
    description TEXT,
    website TEXT,
    use_place_photo INTEGER NOT NULL DEFAULT 0,
    photo_reference TEXT,
    image_url TEXT,
    google_id TEXT UNIQUE
);
CREATE INDEX IF NOT EXISTS idx_calendars_date_time ON calendars(date_time);

CREATE TABLE IF NOT EXISTS pieces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    composer TEXT NOT NULL DEFAULT '',
    piece TEXT NOT NULL CHECK (length(piece) > 0)
);

CREATE TABLE IF NOT EXISTS collaborators (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(name) > 0),
    instrument TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS programs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS calendar_pieces (
    calendar_id INTEGER NOT NULL REFERENCES calendars(id) ON DELETE CASCADE,
    piece_id INTEGER NOT NULL REFERENCES pieces(id) ON DELETE CASCADE,
    sort_order INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (calendar_id, piece_id)
);
CREATE INDEX IF NOT EXISTS idx_calendar_pieces_piece ON calendar_pieces(piece_id);

CREATE TABLE IF NOT EXISTS calendar_collaborators (
    calendar_id INTEGER NOT NULL REFERENCES calendars(id) ON DELETE CASCADE,
    collaborator_id INTEGER NOT NULL REFERENCES collaborators(id) ON DELETE CASCADE,
    sort_order INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (calendar_id, collaborator_id)
);
CREATE INDEX IF NOT EXISTS idx_calendar_collaborators_collaborator
    ON calendar_collaborators(collaborator_id);

CREATE TABLE IF NOT EXISTS program_pieces (
    program_id INTEGER NOT NULL REFERENCES programs(id) ON DELETE CASCADE,
    piece_id INTEGER NOT NULL REFERENCES pieces(id) ON DELETE CASCADE,
    sort_order INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (program_id, piece_id)
);

CREATE TABLE IF NOT EXISTS music (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    composer TEXT NOT NULL DEFAULT '',
    piece TEXT NOT NULL CHECK (length(piece) > 0),
    contributors TEXT,
    category TEXT NOT NULL DEFAULT '',
    year INTEGER,
    audio_url TEXT
);

CREATE TABLE IF NOT EXISTS discs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL CHECK (length(title) > 0),
    label TEXT,
    release_date TEXT,
    description TEXT,
    image_url TEXT,
    buy_url TEXT
);

CREATE TABLE IF NOT EXISTS acclaims (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    quote TEXT NOT NULL CHECK (length(quote) > 0),
    author TEXT NOT NULL DEFAULT '',
    website TEXT,
    short INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS bios (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    paragraph TEXT NOT NULL,
    paragraph_order INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    caption TEXT,
    credit TEXT,
    category TEXT NOT NULL DEFAULT '',
    width INTEGER,
    height INTEGER,
    omit_from_gallery INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sku TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT,
    category TEXT NOT NULL DEFAULT '',
    price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
    image_url TEXT
);

CREATE TABLE IF NOT EXISTS tokens (
    name TEXT PRIMARY KEY,
    access_token TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    calendar_id INTEGER NOT NULL UNIQUE,
    action TEXT NOT NULL CHECK (action IN ('upsert', 'delete')),
    google_id TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    revision INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL CHECK (status IN ('pending', 'failed')),
    next_attempt_at TEXT NOT NULL,
    last_error TEXT,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sync_jobs_due ON sync_jobs(status, next_attempt_at);
"#;
