//! Lockers for KMALL data
use crate::index::FileIndex;
use crate::model::datetime;
use crate::parser::{Datagram, DatagramKind};
use crate::{Error, Result};
use binrw::io::BufReader;
use std::collections::{btree_map, BTreeMap};
use std::fs::{read_dir, File};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{debug, warn};

use std::sync::mpsc;
use std::thread;

type LockerKey = (DatagramKind, OffsetDateTime);
type LockerValue = Vec<(PathBuf, u64)>;

/// File extensions of KMALL streams, plain and compressed
const EXTENSIONS: [&str; 3] = ["kmall", "0z", "1z"];

/// A representation of an on-disk KMALL data set
///
/// A `Locker` contains an in-memory [`BTreeMap`] index that maps keys to the
/// file paths and byte offsets where matching datagrams can be found. Keys
/// are the datagram kind and the header time, so queries such as finding all
/// `#SKM` datagrams between two times are fast. Several datagrams can share a
/// key (one `#MRZ` per receive fan, for instance), so each key holds a list.
pub struct Locker {
    path: PathBuf,
    tree: BTreeMap<LockerKey, LockerValue>,
}

impl Locker {
    /// Open a locker at the given directory
    ///
    /// This indexes every KMALL file in the directory, one thread per file.
    ///
    /// # Errors
    ///
    /// This function returns an error when `read_dir` errors
    pub fn open<P>(path: P) -> Result<Self>
    where
        PathBuf: From<P>,
    {
        let mut locker = Locker {
            path: PathBuf::from(path),
            tree: BTreeMap::new(),
        };
        locker.build_index()?;
        Ok(locker)
    }

    /// Scan the `Locker` directory to build the index
    ///
    /// This will clear the current index and rescan all of the files in
    /// the directory. Files that fail to index are logged and left out.
    pub fn build_index(&mut self) -> Result<()> {
        self.tree.clear();

        let dir = read_dir(&self.path)?;
        let (tx, rx) = mpsc::channel();

        for entry in dir {
            let filepath = entry?.path();
            let is_kmall = filepath
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXTENSIONS.contains(&e));
            if !filepath.is_file() || !is_kmall {
                continue;
            }
            let tx1 = tx.clone();
            thread::spawn(move || {
                let index = match FileIndex::open(&filepath) {
                    Ok(index) => index,
                    Err(e) => {
                        warn!(path = %filepath.display(), error = %e, "could not index file");
                        return;
                    }
                };
                for e in &index.entries {
                    let Some(kind) = e.datagram_kind() else {
                        continue;
                    };
                    let key = (kind, datetime(e.time));
                    // the receiver only goes away if the locker does
                    if tx1.send((key, (filepath.clone(), e.offset))).is_err() {
                        return;
                    }
                }
            });
        }

        // Explicitly drop the Sender to close the channel
        drop(tx);

        for (key, value) in rx {
            self.tree.entry(key).or_default().push(value);
        }
        for values in self.tree.values_mut() {
            values.sort();
        }
        debug!(keys = self.tree.len(), "locker indexed");
        Ok(())
    }

    /// Return a reference to the path of the locker
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return a reference to the underlying [`BTreeMap`]
    pub fn tree(&self) -> &BTreeMap<LockerKey, LockerValue> {
        &self.tree
    }

    /// Get an iterator over the entries of the locker, sorted by key
    pub fn iter(&self) -> Iter {
        Iter {
            iter: self.tree.iter(),
        }
    }

    /// Entries of one kind between two times, inclusive
    pub fn range(
        &self,
        kind: DatagramKind,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> btree_map::Range<'_, LockerKey, LockerValue> {
        self.tree.range((kind, from)..=(kind, to))
    }

    /// Decode the datagrams stored under `key`
    ///
    /// # Errors
    ///
    /// This method returns an error if the key is not found in the index tree or
    /// if there is an error reading a datagram from its file.
    pub fn get(&self, key: &LockerKey) -> Result<Vec<Datagram>> {
        let values = self.tree.get(key).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Key not found",
            ))
        })?;
        values
            .iter()
            .map(|(path, offset)| {
                let mut f = BufReader::new(File::open(path)?);
                f.seek(SeekFrom::Start(*offset))?;
                Datagram::read(&mut f)
            })
            .collect()
    }
}

/// An iterator over the entries of the locker
///
/// This should be created by calling `iter` on a `Locker`.
pub struct Iter<'a> {
    iter: btree_map::Iter<'a, LockerKey, LockerValue>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a LockerKey, &'a LockerValue);

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

impl<'a> ExactSizeIterator for Iter<'a> {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::multibeam::test::sample_mrz;
    use crate::parser::sensor::test::sample_skm;
    use crate::parser::Record;
    use std::fs;

    #[test]
    fn locker_indexes_every_kmall_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = [
            sample_skm(100).to_bytes().unwrap(),
            sample_mrz(1).to_bytes().unwrap(),
        ]
        .concat();
        fs::write(dir.path().join("a.kmall"), a).unwrap();
        fs::write(dir.path().join("b.kmall"), sample_skm(200).to_bytes().unwrap()).unwrap();
        fs::write(dir.path().join("notes.txt"), b"not kmall").unwrap();

        let locker = Locker::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(locker.iter().count(), 3);

        let skm: Vec<_> = locker
            .range(
                DatagramKind::KmBinary,
                OffsetDateTime::UNIX_EPOCH,
                datetime(1.0e9),
            )
            .collect();
        assert_eq!(skm.len(), 2);

        let (key, _) = locker
            .iter()
            .find(|(k, _)| k.0 == DatagramKind::RangeAndDepth)
            .unwrap();
        let got = locker.get(key).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].kind(), Some(DatagramKind::RangeAndDepth));
        assert!(locker
            .get(&(DatagramKind::Clock, OffsetDateTime::UNIX_EPOCH))
            .is_err());
    }
}
