//! Purpose: Fetch TradingHours CSV archives into the local remote mirror.
//! Exports: `DataSource`, `HttpDataSource`, `DirectoryDataSource`, `LocalMirror`.
//! Role: External collaborator of the catalog; owns staleness detection and download.
//! Invariants: Files are installed atomically (temp name then rename) under `<remote>/csv`.
//! Invariants: The local timestamp is written only after every file is installed.
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use url::Url;

use crate::core::error::{Error, ErrorKind};
use crate::declared::DescriptorTable;

pub const TIMESTAMP_FILE: &str = "last-updated.txt";
pub const CSV_FOLDER: &str = "csv";

pub trait DataSource {
    fn remote_timestamp(&self) -> Result<OffsetDateTime, Error>;

    fn local_timestamp(&self) -> Result<Option<OffsetDateTime>, Error>;

    /// True when nothing was downloaded yet or the remote data is newer.
    fn needs_download(&self) -> Result<bool, Error> {
        let Some(local) = self.local_timestamp()? else {
            return Ok(true);
        };
        Ok(self.remote_timestamp()? > local)
    }

    /// Replaces the mirrored CSV files; returns only once every file is in place.
    fn download(&self) -> Result<(), Error>;
}

/// Local copy of the remote data: `<remote>/csv/*.csv` plus `<remote>/last-updated.txt`.
#[derive(Clone, Debug)]
pub struct LocalMirror {
    root: PathBuf,
}

impl LocalMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn csv_folder(&self) -> PathBuf {
        self.root.join(CSV_FOLDER)
    }

    pub fn timestamp(&self) -> Result<Option<OffsetDateTime>, Error> {
        read_timestamp(&self.root.join(TIMESTAMP_FILE))
    }

    pub fn record_timestamp(&self, timestamp: OffsetDateTime) -> Result<(), Error> {
        let text = format_timestamp(timestamp)?;
        let path = self.root.join(TIMESTAMP_FILE);
        write_atomic(&path, &mut text.as_bytes())
    }

    pub fn install(&self, filename: &str, reader: &mut dyn Read) -> Result<PathBuf, Error> {
        let folder = self.csv_folder();
        fs::create_dir_all(&folder).map_err(|err| Error::io(err, &folder))?;
        let path = folder.join(filename);
        write_atomic(&path, reader)?;
        tracing::debug!(path = %path.display(), "installed source file");
        Ok(path)
    }
}

fn write_atomic(path: &Path, reader: &mut dyn Read) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| Error::io(err, parent))?;
    }
    let temp = path.with_extension("partial");
    let mut file = File::create(&temp).map_err(|err| Error::io(err, &temp))?;
    io::copy(reader, &mut file).map_err(|err| Error::io(err, &temp))?;
    file.sync_all().map_err(|err| Error::io(err, &temp))?;
    fs::rename(&temp, path).map_err(|err| Error::io(err, path))
}

fn read_timestamp(path: &Path) -> Result<Option<OffsetDateTime>, Error> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(Error::io(err, path)),
    };
    parse_timestamp(&text).map(Some).map_err(|err| err.with_path(path))
}

pub fn parse_timestamp(text: &str) -> Result<OffsetDateTime, Error> {
    OffsetDateTime::parse(text.trim(), &Rfc3339).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message(format!("invalid timestamp {:?}", text.trim()))
            .with_source(err)
    })
}

pub fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, Error> {
    timestamp.format(&Rfc3339).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to format timestamp")
            .with_source(err)
    })
}

#[derive(Deserialize)]
struct LastUpdatedEnvelope {
    last_updated: String,
}

/// TradingHours HTTP API: `GET <base>/last-updated` and `GET <base>/csv/<file>.csv`.
pub struct HttpDataSource {
    base_url: Url,
    token: Option<String>,
    agent: ureq::Agent,
    mirror: LocalMirror,
    filenames: Vec<String>,
}

impl HttpDataSource {
    pub fn new(base_url: &str, mirror: LocalMirror) -> Result<Self, Error> {
        let base_url = Url::parse(base_url).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid source url {base_url:?}"))
                .with_source(err)
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("source url must use http or https"));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(120))
            .build();
        Ok(Self {
            base_url,
            token: None,
            agent,
            mirror,
            filenames: declared_filenames(),
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let joined = format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid endpoint {joined:?}"))
                .with_source(err)
        })
    }

    fn get(&self, url: &Url) -> Result<ureq::Response, Error> {
        let mut request = self.agent.get(url.as_str());
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        match request.call() {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(code, _)) => Err(Error::new(status_error_kind(code))
                .with_message(format!("GET {url} returned HTTP {code}"))
                .with_hint(status_hint(code))),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message(format!("GET {url} failed"))
                .with_source(err)),
        }
    }
}

impl DataSource for HttpDataSource {
    fn remote_timestamp(&self) -> Result<OffsetDateTime, Error> {
        let url = self.endpoint("last-updated")?;
        let body = self.get(&url)?.into_string().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read last-updated response")
                .with_source(err)
        })?;
        let envelope: LastUpdatedEnvelope = serde_json::from_str(&body).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("unexpected last-updated response")
                .with_source(err)
        })?;
        parse_timestamp(&envelope.last_updated)
    }

    fn local_timestamp(&self) -> Result<Option<OffsetDateTime>, Error> {
        self.mirror.timestamp()
    }

    fn download(&self) -> Result<(), Error> {
        let remote = self.remote_timestamp()?;
        for filename in &self.filenames {
            let url = self.endpoint(&format!("{CSV_FOLDER}/{filename}"))?;
            let response = self.get(&url)?;
            let mut reader = response.into_reader();
            self.mirror.install(filename, &mut reader)?;
        }
        self.mirror.record_timestamp(remote)?;
        tracing::info!(source = %self.base_url, files = self.filenames.len(), "download finished");
        Ok(())
    }
}

fn status_error_kind(code: u16) -> ErrorKind {
    match code {
        401 | 403 => ErrorKind::Permission,
        404 => ErrorKind::NotFound,
        _ => ErrorKind::Io,
    }
}

fn status_hint(code: u16) -> &'static str {
    match code {
        401 | 403 => "Set TRADINGHOURS_TOKEN to a valid API token.",
        404 => "Check the --source url.",
        _ => "Retry later; the data service may be unavailable.",
    }
}

/// A local directory of CSV files standing in for the remote service.
pub struct DirectoryDataSource {
    dir: PathBuf,
    mirror: LocalMirror,
    filenames: Vec<String>,
}

impl DirectoryDataSource {
    pub fn new(dir: impl Into<PathBuf>, mirror: LocalMirror) -> Self {
        Self {
            dir: dir.into(),
            mirror,
            filenames: declared_filenames(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DataSource for DirectoryDataSource {
    fn remote_timestamp(&self) -> Result<OffsetDateTime, Error> {
        if let Some(stamp) = read_timestamp(&self.dir.join(TIMESTAMP_FILE))? {
            return Ok(stamp);
        }
        let mut newest: Option<SystemTime> = None;
        for filename in &self.filenames {
            let path = self.dir.join(filename);
            match fs::metadata(&path) {
                Ok(meta) => {
                    let modified = meta.modified().map_err(|err| Error::io(err, &path))?;
                    newest = Some(newest.map_or(modified, |seen| seen.max(modified)));
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(Error::io(err, &path)),
            }
        }
        newest.map(OffsetDateTime::from).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("source directory has no data files")
                .with_path(&self.dir)
        })
    }

    fn local_timestamp(&self) -> Result<Option<OffsetDateTime>, Error> {
        self.mirror.timestamp()
    }

    fn download(&self) -> Result<(), Error> {
        let remote = self.remote_timestamp()?;
        for filename in &self.filenames {
            let path = self.dir.join(filename);
            let mut file = File::open(&path).map_err(|err| {
                Error::io(err, &path).with_message("source file is unavailable")
            })?;
            self.mirror.install(filename, &mut file)?;
        }
        self.mirror.record_timestamp(remote)?;
        tracing::info!(source = %self.dir.display(), files = self.filenames.len(), "copy finished");
        Ok(())
    }
}

fn declared_filenames() -> Vec<String> {
    DescriptorTable::standard()
        .iter()
        .map(|file| file.filename())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        DataSource, DirectoryDataSource, HttpDataSource, LocalMirror, TIMESTAMP_FILE,
        format_timestamp, parse_timestamp, status_error_kind,
    };
    use crate::core::error::ErrorKind;
    use std::fs;
    use std::path::Path;

    fn write_sources(dir: &Path) {
        for name in [
            "currencies",
            "currency-holidays",
            "markets",
            "holidays",
            "schedules",
        ] {
            fs::write(dir.join(format!("{name}.csv")), format!("{name}\n")).expect("write");
        }
    }

    #[test]
    fn timestamps_round_trip_rfc3339() {
        let stamp = parse_timestamp("2024-03-01T12:30:00Z\n").expect("parse");
        assert_eq!(format_timestamp(stamp).expect("format"), "2024-03-01T12:30:00Z");
        assert_eq!(
            parse_timestamp("yesterday").expect_err("bad").kind(),
            ErrorKind::Corrupt
        );
    }

    #[test]
    fn directory_source_downloads_and_tracks_staleness() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source_dir = temp.path().join("source");
        fs::create_dir_all(&source_dir).expect("mkdir");
        write_sources(&source_dir);
        fs::write(source_dir.join(TIMESTAMP_FILE), "2024-01-01T00:00:00Z\n").expect("stamp");

        let mirror = LocalMirror::new(temp.path().join("remote"));
        let source = DirectoryDataSource::new(&source_dir, mirror.clone());
        assert_eq!(source.local_timestamp().expect("local"), None);
        assert!(source.needs_download().expect("needs"));

        source.download().expect("download");
        assert!(mirror.csv_folder().join("currency-holidays.csv").exists());
        assert!(!mirror.csv_folder().join("currency-holidays.partial").exists());
        assert_eq!(
            source.local_timestamp().expect("local"),
            Some(parse_timestamp("2024-01-01T00:00:00Z").expect("parse"))
        );
        assert!(!source.needs_download().expect("fresh"));

        fs::write(source_dir.join(TIMESTAMP_FILE), "2024-02-01T00:00:00Z\n").expect("stamp");
        assert!(source.needs_download().expect("stale"));
    }

    #[test]
    fn directory_source_without_stamp_uses_file_times() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_sources(temp.path());
        let mirror = LocalMirror::new(temp.path().join("m"));
        let source = DirectoryDataSource::new(temp.path(), mirror);
        source.remote_timestamp().expect("mtime stamp");

        let empty = tempfile::tempdir().expect("tempdir");
        let mirror = LocalMirror::new(empty.path().join("m"));
        let source = DirectoryDataSource::new(empty.path(), mirror);
        assert_eq!(
            source.remote_timestamp().expect_err("no files").kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn missing_source_file_aborts_download_before_stamp() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source_dir = temp.path().join("source");
        fs::create_dir_all(&source_dir).expect("mkdir");
        fs::write(source_dir.join("currencies.csv"), "x\n").expect("write");

        let mirror = LocalMirror::new(temp.path().join("remote"));
        let source = DirectoryDataSource::new(&source_dir, mirror.clone());
        let err = source.download().expect_err("missing files");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(mirror.timestamp().expect("stamp"), None);
    }

    #[test]
    fn http_endpoints_join_under_base() {
        let mirror = LocalMirror::new("/tmp/remote");
        let source = HttpDataSource::new("https://api.example.com/v3/", mirror.clone())
            .expect("source");
        assert_eq!(
            source.endpoint("csv/markets.csv").expect("url").as_str(),
            "https://api.example.com/v3/csv/markets.csv"
        );
        assert_eq!(
            HttpDataSource::new("ftp://example.com", mirror)
                .err()
                .expect("scheme")
                .kind(),
            ErrorKind::Usage
        );
    }

    #[test]
    fn http_status_codes_map_to_kinds() {
        assert_eq!(status_error_kind(401), ErrorKind::Permission);
        assert_eq!(status_error_kind(403), ErrorKind::Permission);
        assert_eq!(status_error_kind(404), ErrorKind::NotFound);
        assert_eq!(status_error_kind(500), ErrorKind::Io);
    }
}
