//! Database schema

/// SQL schema for initialization
pub const SCHEMA: &str = r"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS rides (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'regular',
    organizer TEXT,
    date TEXT NOT NULL,
    meeting_point TEXT,
    route_link TEXT,
    distance_km REAL,
    duration_min INTEGER,
    speed_min REAL,
    speed_max REAL,
    info TEXT,
    cancelled BOOLEAN NOT NULL DEFAULT 0,
    created_by INTEGER NOT NULL,
    updated_by INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rides_creator_date ON rides(created_by, date DESC);

CREATE TABLE IF NOT EXISTS ride_messages (
    ride_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    chat_id INTEGER NOT NULL,
    message_id INTEGER NOT NULL,
    thread_id INTEGER,

    PRIMARY KEY (ride_id, chat_id, message_id),
    FOREIGN KEY (ride_id) REFERENCES rides(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_ride_messages_order ON ride_messages(ride_id, position);

CREATE TABLE IF NOT EXISTS participants (
    ride_id TEXT NOT NULL,
    user_id INTEGER NOT NULL,
    state TEXT NOT NULL,
    username TEXT,
    first_name TEXT,
    last_name TEXT,
    updated_at TEXT NOT NULL,

    PRIMARY KEY (ride_id, user_id),
    FOREIGN KEY (ride_id) REFERENCES rides(id) ON DELETE CASCADE
);
";

/// Columns selected for a ride row, in `parse_ride_row` order
pub const RIDE_COLUMNS: &str = "id, title, category, organizer, date, meeting_point, route_link,
    distance_km, duration_min, speed_min, speed_max, info, cancelled,
    created_by, updated_by, created_at, updated_at";
