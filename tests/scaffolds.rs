use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use np_harvest::app::{App, NoopSink};
use np_harvest::config::{HarvestConfig, ScaffoldQuery};
use np_harvest::error::HarvestError;
use np_harvest::executor::{QueryExecutor, Sleeper};
use np_harvest::sparql::{SparqlClient, SparqlResponse};
use np_harvest::table::ResultTable;

struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _duration: std::time::Duration) {}
}

/// `indole` returns duplicated rows, `quinoline` a server error.
struct ScaffoldEndpoint;

impl SparqlClient for ScaffoldEndpoint {
    fn get(&self, query: &str) -> Result<SparqlResponse, HarvestError> {
        if query.contains("quinoline") {
            return Ok(SparqlResponse {
                status: 503,
                body: "Service Unavailable".to_string(),
            });
        }
        let row = |genus: &str, smiles: &str, reference: &str| {
            format!(
                r#"{{"genus_name":{{"type":"literal","value":"{genus}"}},"smiles":{{"type":"literal","value":"{smiles}"}},"reference":{{"type":"uri","value":"{reference}"}},"compound":{{"type":"uri","value":"Q1"}}}}"#
            )
        };
        let bindings = [
            row("Vinca minor", "C1=CC=C2", "Q10"),
            row("Vinca major", "C1=CC=C2", "Q10"),
            row("Rauvolfia serpentina", "C1=CC=C2", "Q11"),
            row("Rauvolfia", "N1", "Q11"),
        ]
        .join(",");
        Ok(SparqlResponse {
            status: 200,
            body: format!(
                r#"{{"head":{{"vars":["compound","genus_name","smiles","reference"]}},"results":{{"bindings":[{bindings}]}}}}"#
            ),
        })
    }
}

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

fn write_query(root: &Utf8Path, name: &str) -> Utf8PathBuf {
    let path = root.join(format!("queries/{name}.rq"));
    fs::create_dir_all(root.join("queries").as_std_path()).unwrap();
    fs::write(path.as_std_path(), format!("SELECT * WHERE {{ # {name}\n}}")).unwrap();
    path
}

fn app_in(root: &Utf8Path, scaffolds: Vec<ScaffoldQuery>) -> App<ScaffoldEndpoint, NoSleep> {
    let config = HarvestConfig {
        output_file: root.join("data/nps_in_genera.csv"),
        log_dir: root.join("logs"),
        failure_dir: root.join("logs"),
        scaffold_output_dir: root.join("data/wikidata"),
        scaffolds,
        ..HarvestConfig::default()
    };
    App::new(config, QueryExecutor::with_sleeper(ScaffoldEndpoint, NoSleep))
}

#[test]
fn scaffold_rows_are_cleaned_and_written_per_group() {
    let (_temp, root) = temp_root();
    let query_path = write_query(&root, "indole");
    let app = app_in(
        &root,
        vec![ScaffoldQuery {
            name: "indole".to_string(),
            query_path,
        }],
    );

    let result = app.harvest_scaffolds(&NoopSink);

    assert!(result.skipped.is_empty());
    assert_eq!(result.written.len(), 1);
    let item = &result.written[0];
    assert_eq!(item.output_path, root.join("data/wikidata/indole_in_genera.csv"));
    assert_eq!(item.summary.rows, 3);
    assert_eq!(item.summary.unique_structures, 2);
    assert_eq!(item.summary.unique_genera, 2);
    assert_eq!(item.summary.unique_references, 2);
    assert_eq!(
        item.summary.describe(),
        "The indole query returned 2 unique structures in 2 genera, based on 2 literature references."
    );

    let table = ResultTable::load(&item.output_path).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.distinct_values("genus_name"), vec!["Vinca", "Rauvolfia"]);
}

#[test]
fn missing_query_file_and_failed_group_are_skipped() {
    let (_temp, root) = temp_root();
    let indole = write_query(&root, "indole");
    let quinoline = write_query(&root, "quinoline");
    let app = app_in(
        &root,
        vec![
            ScaffoldQuery {
                name: "absent".to_string(),
                query_path: root.join("queries/absent.rq"),
            },
            ScaffoldQuery {
                name: "quinoline".to_string(),
                query_path: quinoline,
            },
            ScaffoldQuery {
                name: "indole".to_string(),
                query_path: indole,
            },
        ],
    );

    let result = app.harvest_scaffolds(&NoopSink);

    let skipped = result
        .skipped
        .iter()
        .map(|skip| skip.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(skipped, vec!["absent", "quinoline"]);
    assert!(result.skipped[1].reason.contains("503"));
    assert_eq!(result.written.len(), 1);
    assert!(
        !root
            .join("data/wikidata/quinoline_in_genera.csv")
            .as_std_path()
            .exists()
    );
}
