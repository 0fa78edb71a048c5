//! GeoJSON files on disk, one FeatureCollection per artifact.
//!
//! Layout under the root directory:
//! `postcodes/<outcode>/<code>.geojson`, `vertical-streets/`, `sectors/`,
//! `districts/` and `areas/`. Spaces in names become underscores; names
//! longer than [`MAX_FILE_STEM`] are shortened and end in `~<hash>`.

use std::fs::{self, File};
use std::hash::Hasher;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use geo::MultiPolygon;
use rustc_hash::FxHasher;

use super::{geojson, Artifact, ArtifactKey, ArtifactKind, Properties, StorageSink};
use crate::constants::MAX_FILE_STEM;
use crate::{Error, Result};

#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    gzip: bool,
    writes: AtomicUsize,
    temp_counter: AtomicUsize,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::file(&root, e))?;
        Ok(Self {
            root,
            gzip: false,
            writes: AtomicUsize::new(0),
            temp_counter: AtomicUsize::new(0),
        })
    }

    /// Write `.geojson.gz` files instead of plain `.geojson`.
    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// File path for `key`.
    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        let dir = match key.kind {
            ArtifactKind::Unit => {
                let outcode = key.outcode().unwrap_or("unknown");
                self.root.join("postcodes").join(outcode)
            }
            ArtifactKind::VerticalStreet => self.root.join("vertical-streets"),
            ArtifactKind::Sector => self.root.join("sectors"),
            ArtifactKind::District => self.root.join("districts"),
            ArtifactKind::Area => self.root.join("areas"),
        };
        let extension = if self.gzip { "geojson.gz" } else { "geojson" };
        dir.join(format!("{}.{}", file_stem(&key.name), extension))
    }

    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| Error::Storage(format!("{} has no parent directory", path.display())))?;
        fs::create_dir_all(dir).map_err(|e| Error::file(dir, e))?;

        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let file_name = path.file_name().and_then(|f| f.to_str()).unwrap_or("artifact");
        let temp = dir.join(format!(".{}.{}.{}.tmp", file_name, std::process::id(), n));

        let result = (|| -> std::io::Result<()> {
            let file = File::create(&temp)?;
            if self.gzip {
                let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
                encoder.write_all(bytes)?;
                encoder.finish()?.flush()?;
            } else {
                let mut writer = BufWriter::new(file);
                writer.write_all(bytes)?;
                writer.flush()?;
            }
            fs::rename(&temp, path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp);
            return Err(Error::file(path, e));
        }
        Ok(())
    }
}

fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| match c {
            ' ' => '_',
            '/' | '\\' => '-',
            c => c,
        })
        .collect();
    if stem.len() <= MAX_FILE_STEM {
        return stem;
    }

    let mut hasher = FxHasher::default();
    hasher.write(name.as_bytes());
    let suffix = format!("~{:016x}", hasher.finish());
    let mut keep = MAX_FILE_STEM - suffix.len();
    while !stem.is_char_boundary(keep) {
        keep -= 1;
    }
    format!("{}{}", &stem[..keep], suffix)
}

impl StorageSink for DirectorySink {
    fn put(&self, key: &ArtifactKey, geometry: &MultiPolygon<f64>, properties: &Properties) -> Result<()> {
        let value = geojson::encode_artifact(geometry, properties);
        let bytes = serde_json::to_vec(&value)?;
        self.write_atomically(&self.path_for(key), &bytes)?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn exists(&self, key: &ArtifactKey) -> Result<bool> {
        Ok(self.path_for(key).is_file())
    }

    fn get(&self, key: &ArtifactKey) -> Result<Option<Artifact>> {
        let path = self.path_for(key);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::file(&path, e)),
        };
        let mut text = String::new();
        let read = if self.gzip {
            GzDecoder::new(BufReader::new(file)).read_to_string(&mut text)
        } else {
            BufReader::new(file).read_to_string(&mut text)
        };
        read.map_err(|e| Error::file(&path, e))?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        geojson::decode_artifact(key, &value).map(Some)
    }
}
