use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::HarvestConfig;
use crate::domain::FailureRecord;
use crate::error::HarvestError;
use crate::table::ResultTable;

/// On-disk locations of one harvest: the result table, failure files and
/// scaffold outputs.
#[derive(Debug, Clone)]
pub struct Store {
    output_path: Utf8PathBuf,
    failure_dir: Utf8PathBuf,
    scaffold_dir: Utf8PathBuf,
}

impl Store {
    pub fn new_with_paths(
        output_path: Utf8PathBuf,
        failure_dir: Utf8PathBuf,
        scaffold_dir: Utf8PathBuf,
    ) -> Self {
        Self {
            output_path,
            failure_dir,
            scaffold_dir,
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new_with_paths(
            config.output_file.clone(),
            config.failure_dir.clone(),
            config.scaffold_output_dir.clone(),
        )
    }

    pub fn output_path(&self) -> &Utf8Path {
        &self.output_path
    }

    pub fn failure_dir(&self) -> &Utf8Path {
        &self.failure_dir
    }

    pub fn scaffold_output_path(&self, name: &str) -> Utf8PathBuf {
        self.scaffold_dir.join(format!("{name}_in_genera.csv"))
    }

    /// The persisted result table, if one exists.
    pub fn load_table(&self) -> Result<Option<ResultTable>, HarvestError> {
        if !self.output_path.as_std_path().exists() {
            return Ok(None);
        }
        ResultTable::load(&self.output_path).map(Some)
    }

    pub fn write_table(&self, table: &ResultTable) -> Result<(), HarvestError> {
        write_table_atomic(&self.output_path, table)
    }

    /// Writes `<timestamp>_failed_queries.csv`, appending `_N` when a file
    /// with that name already exists.
    pub fn write_failures(
        &self,
        failures: &[FailureRecord],
        timestamp: &str,
    ) -> Result<Utf8PathBuf, HarvestError> {
        fs::create_dir_all(self.failure_dir.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;

        let mut suffix = 0usize;
        let (path, file) = loop {
            let name = match suffix {
                0 => format!("{timestamp}_failed_queries.csv"),
                n => format!("{timestamp}_failed_queries_{n}.csv"),
            };
            let path = self.failure_dir.join(name);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path.as_std_path())
            {
                Ok(file) => break (path, file),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(err) => {
                    return Err(HarvestError::Filesystem(format!("create {path}: {err}")));
                }
            }
        };

        let csv_err = |err: csv::Error| HarvestError::Csv {
            path: path.to_string(),
            message: err.to_string(),
        };
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(["Genus", "Reason"]).map_err(csv_err)?;
        for failure in failures {
            writer
                .write_record([failure.genus.as_str(), failure.reason.as_str()])
                .map_err(csv_err)?;
        }
        writer.flush().map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        Ok(path)
    }
}

/// Replaces `path` with `table` through a temp file in the same directory,
/// so a reader never sees a partial table.
pub fn write_table_atomic(path: &Utf8Path, table: &ResultTable) -> Result<(), HarvestError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
        _ => Utf8PathBuf::from("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("np-harvest-table")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    table
        .write_csv(temp.as_file_mut())
        .map_err(|err| HarvestError::Csv {
            path: path.to_string(),
            message: err.to_string(),
        })?;
    temp.as_file_mut()
        .flush()
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ResultRecord;

    fn store_in(dir: &Utf8Path) -> Store {
        Store::new_with_paths(
            dir.join("data/nps_in_genera.csv"),
            dir.join("logs"),
            dir.join("scaffolds"),
        )
    }

    #[test]
    fn load_missing_table_is_none() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        assert!(store_in(&root).load_table().unwrap().is_none());
    }

    #[test]
    fn table_round_trips_through_disk() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = store_in(&root);
        let mut table = ResultTable::new();
        table.push(ResultRecord::from_iter([("genus_name", "Rosa"), ("smiles", "C")]));

        store.write_table(&table).unwrap();
        assert_eq!(store.load_table().unwrap(), Some(table));
    }

    #[test]
    fn failure_files_never_overwrite() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = store_in(&root);
        let failures = vec![FailureRecord {
            genus: "Bogus".to_string(),
            reason: "SPARQL endpoint returned status 500: boom".to_string(),
        }];

        let first = store.write_failures(&failures, "20260101_120000").unwrap();
        let second = store.write_failures(&failures, "20260101_120000").unwrap();

        assert_ne!(first, second);
        assert!(first.as_str().ends_with("20260101_120000_failed_queries.csv"));
        assert!(second.as_str().ends_with("20260101_120000_failed_queries_1.csv"));
        let content = fs::read_to_string(first.as_std_path()).unwrap();
        assert_eq!(
            content,
            "Genus,Reason\nBogus,SPARQL endpoint returned status 500: boom\n"
        );
    }

    #[test]
    fn scaffold_outputs_are_named_by_group() {
        let store = store_in(Utf8Path::new("/tmp/h"));
        assert!(
            store
                .scaffold_output_path("indole")
                .ends_with("scaffolds/indole_in_genera.csv")
        );
    }
}
