use crate::convert::ExportFault;
use crate::jvm::{BinaryName, Name};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the register-form container entry
pub const CONTAINER_ENTRY: &str = "classes.dxt";

/// Destination for the serialized output of a conversion
///
/// Entries arrive in the order of the classes in the application. Nothing handed to a sink is
/// meaningful until [`OutputSink::finished`] returns successfully.
pub trait OutputSink {
    /// Receive one stack-form class file
    fn accept_class(&mut self, name: &BinaryName, bytes: Vec<u8>) -> Result<(), ExportFault>;

    /// Receive the register-form container holding every class
    fn accept_container(&mut self, bytes: Vec<u8>) -> Result<(), ExportFault>;

    /// No more entries are coming
    fn finished(&mut self) -> Result<(), ExportFault>;
}

/// Sink collecting everything in memory, keyed by class name
///
/// The register-form container is stored under [`CONTAINER_ENTRY`].
#[derive(Default, Debug)]
pub struct ClassMapSink {
    entries: BTreeMap<String, Vec<u8>>,
    finished: bool,
}

impl ClassMapSink {
    pub fn new() -> ClassMapSink {
        ClassMapSink::default()
    }

    pub fn entries(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.entries
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_map(self) -> BTreeMap<String, Vec<u8>> {
        self.entries
    }

    fn insert(&mut self, key: String, bytes: Vec<u8>) -> Result<(), ExportFault> {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => Err(ExportFault::Encoding(format!(
                "duplicate entry {}",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(bytes);
                Ok(())
            }
        }
    }
}

impl OutputSink for ClassMapSink {
    fn accept_class(&mut self, name: &BinaryName, bytes: Vec<u8>) -> Result<(), ExportFault> {
        self.insert(name.as_str().to_owned(), bytes)
    }

    fn accept_container(&mut self, bytes: Vec<u8>) -> Result<(), ExportFault> {
        self.insert(CONTAINER_ENTRY.to_owned(), bytes)
    }

    fn finished(&mut self) -> Result<(), ExportFault> {
        self.finished = true;
        Ok(())
    }
}

/// Sink writing files under a root directory
///
/// Class files go to `<root>/<binary name>.class` (creating package directories as needed) and
/// the container goes to `<root>/classes.dxt`.
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> DirectorySink {
        DirectorySink {
            root: root.into(),
            written: vec![],
        }
    }

    /// Files written so far
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write_file(&mut self, path: PathBuf, bytes: &[u8]) -> Result<(), ExportFault> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&path)?;
        file.write_all(bytes)?;
        file.flush()?;
        log::debug!("wrote {}", path.display());
        self.written.push(path);
        Ok(())
    }
}

impl OutputSink for DirectorySink {
    fn accept_class(&mut self, name: &BinaryName, bytes: Vec<u8>) -> Result<(), ExportFault> {
        let path = class_path(&self.root, name);
        self.write_file(path, &bytes)
    }

    fn accept_container(&mut self, bytes: Vec<u8>) -> Result<(), ExportFault> {
        let path = self.root.join(CONTAINER_ENTRY);
        self.write_file(path, &bytes)
    }

    fn finished(&mut self) -> Result<(), ExportFault> {
        log::info!(
            "wrote {} files under {}",
            self.written.len(),
            self.root.display()
        );
        Ok(())
    }
}

fn class_path(root: &Path, name: &BinaryName) -> PathBuf {
    let mut path = root.to_path_buf();
    path.push(name.class_file_path());
    path
}
