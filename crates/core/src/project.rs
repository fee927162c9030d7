use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::ProjectError;
use crate::logger;
use crate::object_store::ObjectStore;
use crate::sequence::{Sequence, DEFAULT_SEQUENCE_NAME};
use crate::step::StepList;
use crate::types::ScreenObject;
use crate::watcher::Watcher;

const PREFIX: &str = "project";
const IMAGES_DIR: &str = "images";

#[derive(Serialize)]
struct ProjectOut<'a> {
    sequence_name: &'a str,
    loop_count: i64,
    objects: BTreeMap<&'a str, ScreenObject>,
    steps: &'a StepList,
    #[serde(skip_serializing_if = "no_watchers")]
    listeners: &'a [Watcher],
}

#[derive(Deserialize)]
struct ProjectIn {
    #[serde(default)]
    sequence_name: Option<String>,
    #[serde(default = "one")]
    loop_count: i64,
    #[serde(default)]
    objects: BTreeMap<String, ScreenObject>,
    #[serde(default)]
    steps: StepList,
    #[serde(default)]
    listeners: Vec<Watcher>,
}

fn no_watchers(w: &&[Watcher]) -> bool {
    w.is_empty()
}

fn one() -> i64 {
    1
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ProjectError + '_ {
    move |source| ProjectError::Io { path: path.to_path_buf(), source }
}

/// File a sequence is saved to inside `dir`.
pub fn project_file(seq: &Sequence, dir: &Path) -> PathBuf {
    dir.join(format!("{}.json", seq.name()))
}

/// Write `seq` to `dir/<name>.json`, collecting its images under `dir/images`.
///
/// The file is replaced atomically. In-memory image paths move to the copies
/// and the modified flag clears only once the write has succeeded.
pub fn save(seq: &mut Sequence, dir: &Path) -> Result<PathBuf, ProjectError> {
    logger::register_prefix(PREFIX, logger::COLOR_GRAY);
    let images = dir.join(IMAGES_DIR);
    fs::create_dir_all(&images).map_err(io_err(&images))?;
    let images = fs::canonicalize(&images).map_err(io_err(&images))?;

    let mut staging = Staging::new(&images, dir, seq.objects());
    let mut stored = BTreeMap::new();
    let mut relocated = Vec::new();
    for (name, obj) in seq.objects().iter() {
        let mut out = obj.clone();
        if let ScreenObject::Image { image_path, .. } = &mut out {
            match resolve_image(image_path, dir) {
                Some(source) => {
                    let (rel, copy) = staging.stage(name, &source)?;
                    *image_path = rel;
                    relocated.push((name.to_string(), copy));
                }
                None => logger::warn_p(
                    PREFIX,
                    &format!("image for '{}' not found at {}; stored as-is", name, image_path.display()),
                ),
            }
        }
        stored.insert(name, out);
    }

    let target = project_file(seq, dir);
    let doc = ProjectOut {
        sequence_name: seq.name(),
        loop_count: seq.loop_count(),
        objects: stored,
        steps: seq.steps(),
        listeners: seq.watchers(),
    };
    let json = serde_json::to_string_pretty(&doc)
        .map_err(|source| ProjectError::Json { path: target.clone(), source })?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
    tmp.write_all(json.as_bytes()).map_err(io_err(tmp.path()))?;
    tmp.persist(&target).map_err(|e| ProjectError::Io { path: target.clone(), source: e.error })?;

    for (name, copy) in relocated {
        if let Some(ScreenObject::Image { image_path, .. }) = seq.object_mut(&name) {
            *image_path = copy;
        }
    }
    seq.mark_saved();
    logger::info_p(PREFIX, &format!("saved '{}' to {}", seq.name(), target.display()));
    Ok(target)
}

/// Locate an image file on disk. A relative path is tried against the
/// project directory first, then as given.
fn resolve_image(path: &Path, dir: &Path) -> Option<PathBuf> {
    let candidates = if path.is_absolute() {
        vec![path.to_path_buf()]
    } else {
        vec![dir.join(path), path.to_path_buf()]
    };
    candidates
        .into_iter()
        .filter(|p| p.is_file())
        .find_map(|p| fs::canonicalize(p).ok())
}

/// Assigns each image a file name under `images`, one file per source.
struct Staging<'a> {
    images: &'a Path,
    taken: HashSet<OsString>,
    staged: HashMap<PathBuf, OsString>,
}

impl<'a> Staging<'a> {
    /// Files already inside `images` keep their names and are never overwritten.
    fn new(images: &'a Path, dir: &Path, objects: &ObjectStore) -> Self {
        let mut staged = HashMap::new();
        for (_, obj) in objects.iter() {
            if let ScreenObject::Image { image_path, .. } = obj {
                if let Some(source) = resolve_image(image_path, dir) {
                    if let (Some(file), true) = (source.file_name(), source.parent() == Some(images)) {
                        staged.insert(source.clone(), file.to_os_string());
                    }
                }
            }
        }
        let taken = staged.values().cloned().collect();
        Self { images, taken, staged }
    }

    /// Returns the stored relative path and the absolute location of the copy.
    fn stage(&mut self, name: &str, source: &Path) -> Result<(PathBuf, PathBuf), ProjectError> {
        let file = match self.staged.get(source) {
            Some(file) => file.clone(),
            None => {
                let file = self.free_name(source);
                let copy = self.images.join(&file);
                fs::copy(source, &copy).map_err(io_err(&copy))?;
                if Some(file.as_os_str()) != source.file_name() {
                    logger::warn_p(
                        PREFIX,
                        &format!(
                            "image for '{}' shares its file name with another image; stored as {}",
                            name,
                            Path::new(IMAGES_DIR).join(&file).display()
                        ),
                    );
                }
                self.taken.insert(file.clone());
                self.staged.insert(source.to_path_buf(), file.clone());
                file
            }
        };
        Ok((Path::new(IMAGES_DIR).join(&file), self.images.join(&file)))
    }

    fn free_name(&self, source: &Path) -> OsString {
        let file = source.file_name().map(OsStr::to_os_string).unwrap_or_else(|| "image".into());
        if !self.taken.contains(&file) {
            return file;
        }
        let stem = source.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let ext = source.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
        (2..)
            .map(|n| OsString::from(format!("{}-{}{}", stem, n, ext)))
            .find(|f| !self.taken.contains(f))
            .unwrap_or(file)
    }
}

/// Read a project file. Relative image paths resolve against its directory.
pub fn load(path: &Path) -> Result<Sequence, ProjectError> {
    logger::register_prefix(PREFIX, logger::COLOR_GRAY);
    let text = fs::read_to_string(path).map_err(io_err(path))?;
    let doc: ProjectIn =
        serde_json::from_str(&text).map_err(|source| ProjectError::Json { path: path.to_path_buf(), source })?;

    // loaded image paths are always absolute
    let dir = std::path::absolute(path)
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let mut objects = ObjectStore::new();
    for (name, mut obj) in doc.objects {
        if let ScreenObject::Image { image_path, .. } = &mut obj {
            if image_path.is_relative() {
                *image_path = dir.join(&*image_path);
            }
            if !image_path.is_file() {
                logger::warn_p(PREFIX, &format!("image for '{}' missing: {}", name, image_path.display()));
            }
        }
        objects
            .add(&name, obj)
            .map_err(|source| ProjectError::InvalidObject { name: name.clone(), source })?;
    }

    let name = doc
        .sequence_name
        .filter(|n| !n.is_empty())
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| DEFAULT_SEQUENCE_NAME.to_string());

    let seq = Sequence::from_parts(name, doc.loop_count, objects, doc.steps, doc.listeners);
    logger::info_p(
        PREFIX,
        &format!(
            "loaded '{}': {} object(s), {} step(s)",
            seq.name(),
            seq.objects().len(),
            seq.steps().len()
        ),
    );
    Ok(seq)
}
