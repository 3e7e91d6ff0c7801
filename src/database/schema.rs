pub const PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
";

pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS media_files (
        id INTEGER PRIMARY KEY,
        path TEXT UNIQUE NOT NULL,
        filename TEXT NOT NULL,
        extension TEXT NOT NULL,
        kind TEXT NOT NULL,
        size INTEGER NOT NULL,
        checksum TEXT,
        raw_keywords TEXT,
        mtime INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_media_files_checksum ON media_files(checksum);
    CREATE INDEX IF NOT EXISTS idx_media_files_filename ON media_files(filename);
    CREATE INDEX IF NOT EXISTS idx_media_files_kind ON media_files(kind);

    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY,
        name TEXT UNIQUE NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS file_tags (
        media_file_id INTEGER NOT NULL,
        tag_id INTEGER NOT NULL,
        FOREIGN KEY(media_file_id) REFERENCES media_files(id) ON DELETE CASCADE,
        FOREIGN KEY(tag_id) REFERENCES tags(id) ON DELETE CASCADE,
        PRIMARY KEY(media_file_id, tag_id)
    );

    CREATE INDEX IF NOT EXISTS idx_file_tags_tag ON file_tags(tag_id);
";

pub const MEDIA_FILE_COLUMNS: &str =
    "id, path, filename, extension, kind, size, checksum, raw_keywords, mtime, created_at, updated_at";
