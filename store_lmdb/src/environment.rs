//! LMDB environment setup.

use std::collections::HashMap;
use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use nodegraph_store::Collection;

use crate::LmdbError;

/// Wraps the LMDB environment and one database handle per collection.
pub struct LmdbEnvironment {
    pub(crate) env: Env,
    pub(crate) dbs: HashMap<Collection, Database<Bytes, Bytes>>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path, creating every
    /// collection database that does not exist yet.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment directory is owned by this process; no other
        // handle to the same path is opened concurrently.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(Collection::ALL.len() as u32)
                .open(path)
        }?;

        let mut wtxn = env.write_txn()?;
        let mut dbs = HashMap::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            let db: Database<Bytes, Bytes> =
                env.create_database(&mut wtxn, Some(collection.name()))?;
            dbs.insert(collection, db);
        }
        wtxn.commit()?;

        tracing::info!(path = %path.display(), map_size, "opened LMDB environment");
        Ok(Self { env, dbs })
    }

    pub(crate) fn db(&self, collection: Collection) -> Result<Database<Bytes, Bytes>, LmdbError> {
        self.dbs
            .get(&collection)
            .cloned()
            .ok_or_else(|| LmdbError::UnknownCollection(collection.name().to_string()))
    }

    /// Flush the environment to disk.
    pub fn force_sync(&self) -> Result<(), LmdbError> {
        self.env.force_sync()?;
        Ok(())
    }
}
