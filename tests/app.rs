use std::fs;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use heliocloud_catalog::app::{App, CatalogOptions, FlythroughFiles};
use heliocloud_catalog::catalog::{
    AppendAction, EntryOptions, FlythroughCatalogRequest, KAMODO_CCMC_CITATION,
    ModelCatalogRequest,
};
use heliocloud_catalog::config::{ConfigLoader, FileFormat};
use heliocloud_catalog::domain::{ModelName, StorageLocation};
use heliocloud_catalog::error::CatalogError;
use heliocloud_catalog::flythrough::{FlythroughFile, FlythroughReader};
use heliocloud_catalog::publication::{PublicationClient, PublicationRecord};
use heliocloud_catalog::store::Store;
use heliocloud_catalog::timelist::TimeBoundsSource;

struct MockBounds {
    start: DateTime<Utc>,
    stop: DateTime<Utc>,
}

impl Default for MockBounds {
    fn default() -> Self {
        Self {
            start: Utc.with_ymd_and_hms(2020, 12, 31, 23, 0, 0).unwrap(),
            stop: Utc.with_ymd_and_hms(2021, 1, 2, 1, 0, 0).unwrap(),
        }
    }
}

impl TimeBoundsSource for MockBounds {
    fn file_times(
        &self,
        _model: &ModelName,
        _location: &StorageLocation,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), CatalogError> {
        Ok((self.start, self.stop))
    }
}

#[derive(Default)]
struct MockPublication {
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl PublicationClient for MockPublication {
    fn fetch(&self, resource_url: &str) -> Result<PublicationRecord, CatalogError> {
        self.calls.lock().unwrap().push(resource_url.to_string());
        if self.fail {
            return Err(CatalogError::RemoteStatus {
                status: 404,
                message: "Not Found".to_string(),
            });
        }
        Ok(PublicationRecord {
            run_publication_time: Utc.with_ymd_and_hms(2022, 4, 1, 12, 30, 0).unwrap(),
            raw_json: json!({"runPublicationTime": "2022-04-01T12:30:00Z"}),
        })
    }
}

#[derive(Default)]
struct MockReader;

impl FlythroughReader for MockReader {
    fn read(&self, _path: &Utf8Path) -> Result<FlythroughFile, CatalogError> {
        Err(CatalogError::MalformedUpstreamInput("mock".to_string()))
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 6, 1, 8, 0, 0).unwrap()
}

fn app_in(
    root: &Utf8Path,
    bounds: MockBounds,
    publication: MockPublication,
) -> App<MockBounds, MockPublication, MockReader> {
    let store = Store::new_with_paths(root.join("out"), None);
    let config = ConfigLoader::builtin().unwrap();
    App::new(store, config, bounds, publication, MockReader).with_now(now())
}

fn model_request(model: &str, resource_url: Option<&str>) -> ModelCatalogRequest {
    ModelCatalogRequest {
        model: model.parse().unwrap(),
        run: "Yihua_Zheng_040122_1".parse().unwrap(),
        location: "s3://helio-public/ModelOutputs/GITM/run1/".parse().unwrap(),
        options: EntryOptions {
            resource_url: resource_url.map(str::to_string),
            ..EntryOptions::default()
        },
    }
}

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn model_entry_fields() {
    let (_temp, root) = temp_root();
    let app = app_in(&root, MockBounds::default(), MockPublication::default());

    let result = app
        .catalog_model(
            &model_request("GITM", Some("https://ccmc.example/run/1.json")),
            CatalogOptions::default(),
        )
        .unwrap();
    let entry = &result.entry;

    assert_eq!(entry.id, "GITM-Yihua_Zheng_040122_1");
    assert_eq!(entry.location, "s3://helio-public/ModelOutputs/");
    assert_eq!(entry.start_date, "2020-12-31T23:00:00Z");
    assert_eq!(entry.stop_date, "2021-01-02T01:00:00Z");
    assert!(entry.start_date <= entry.stop_date);
    assert_eq!(entry.modification_date, "2023-06-01T08:00:00Z");
    assert_eq!(entry.creation_date, "2022-04-01T12:30:00Z");
    assert_eq!(entry.index_format, "csv");
    assert_eq!(entry.file_format, vec![FileFormat::Netcdf4, FileFormat::Txt]);
    assert_eq!(entry.resource_url, "https://ccmc.example/run/1.json");
    assert_eq!(entry.contact, "Not supplied");
    assert_eq!(entry.contact_id, "ORCiD not supplied");
    assert_eq!(result.action, Some(AppendAction::Appended));

    let written: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(app.store().catalog_path()).unwrap(),
    )
    .unwrap();
    assert_eq!(written["catalog"][0]["id"], "GITM-Yihua_Zheng_040122_1");
    assert_eq!(written["catalog"][0]["loc"], "s3://helio-public/ModelOutputs/");
}

#[test]
fn creation_date_defaults_to_now_without_resource_url() {
    let (_temp, root) = temp_root();
    let publication = MockPublication::default();
    let app = app_in(&root, MockBounds::default(), publication);

    let result = app
        .catalog_model(&model_request("GITM", Some("  ")), CatalogOptions::default())
        .unwrap();
    assert_eq!(result.entry.creation_date, "2023-06-01T08:00:00Z");
    assert_eq!(result.entry.resource_url, "");
}

#[test]
fn publication_failure_is_surfaced() {
    let (_temp, root) = temp_root();
    let publication = MockPublication {
        fail: true,
        ..MockPublication::default()
    };
    let app = app_in(&root, MockBounds::default(), publication);

    let err = app
        .catalog_model(
            &model_request("GITM", Some("https://ccmc.example/missing.json")),
            CatalogOptions::default(),
        )
        .unwrap_err();
    assert_matches!(err, CatalogError::RemoteStatus { status: 404, .. });
    assert!(!app.store().catalog_path().exists());
}

#[test]
fn unknown_model_is_rejected() {
    let (_temp, root) = temp_root();
    let app = app_in(&root, MockBounds::default(), MockPublication::default());

    let err = app
        .catalog_model(&model_request("NotAModel", None), CatalogOptions::default())
        .unwrap_err();
    assert_matches!(err, CatalogError::UnknownModel(_));
}

#[test]
fn inverted_bounds_are_rejected() {
    let (_temp, root) = temp_root();
    let bounds = MockBounds {
        start: Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap(),
        stop: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
    };
    let app = app_in(&root, bounds, MockPublication::default());

    let err = app
        .catalog_model(&model_request("GITM", None), CatalogOptions::default())
        .unwrap_err();
    assert_matches!(err, CatalogError::InvalidTimeRange { .. });
}

#[test]
fn duplicate_ids_need_replace() {
    let (_temp, root) = temp_root();
    let app = app_in(&root, MockBounds::default(), MockPublication::default());
    let request = model_request("GITM", None);

    app.catalog_model(&request, CatalogOptions::default()).unwrap();
    let err = app
        .catalog_model(&request, CatalogOptions::default())
        .unwrap_err();
    assert_matches!(err, CatalogError::DuplicateCatalogId(_));

    let replaced = app
        .catalog_model(
            &request,
            CatalogOptions {
                replace: true,
                ..CatalogOptions::default()
            },
        )
        .unwrap();
    assert_eq!(replaced.action, Some(AppendAction::Replaced));
}

#[test]
fn catalog_keeps_foreign_keys_and_entries() {
    let (_temp, root) = temp_root();
    let app = app_in(&root, MockBounds::default(), MockPublication::default());
    app.store().ensure_output_root().unwrap();
    fs::write(
        app.store().catalog_path(),
        r#"{"Cloudy": "0.4", "endpoint": "s3://helio-public/", "catalog": [{"id": "other"}]}"#,
    )
    .unwrap();

    app.catalog_model(&model_request("GITM", None), CatalogOptions::default())
        .unwrap();

    let written: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(app.store().catalog_path()).unwrap(),
    )
    .unwrap();
    assert_eq!(written["Cloudy"], "0.4");
    assert_eq!(written["endpoint"], "s3://helio-public/");
    assert_eq!(written["catalog"].as_array().unwrap().len(), 2);
    assert_eq!(written["catalog"][0]["id"], "other");
}

#[test]
fn dry_run_writes_nothing() {
    let (_temp, root) = temp_root();
    let app = app_in(&root, MockBounds::default(), MockPublication::default());

    let result = app
        .catalog_model(
            &model_request("GITM", None),
            CatalogOptions {
                dry_run: true,
                ..CatalogOptions::default()
            },
        )
        .unwrap();
    assert!(result.catalog_path.is_none());
    assert!(result.action.is_none());
    assert!(!app.store().catalog_path().exists());
}

#[test]
fn flythrough_entry_fields() {
    let (_temp, root) = temp_root();
    let app = app_in(&root, MockBounds::default(), MockPublication::default());
    let request = FlythroughCatalogRequest {
        model: "SWMF_GM".parse().unwrap(),
        run: "run1".parse().unwrap(),
        location: "s3://helio-public/FlythroughResults/SWMF_GM/".parse().unwrap(),
        trajectory: "MMS1".to_string(),
        options: EntryOptions::default(),
    };

    let result = app
        .catalog_flythrough(&request, CatalogOptions { dry_run: true, replace: false })
        .unwrap();
    let entry = result.entry;
    assert_eq!(entry.id, "SWMF_GM-run1-Flythrough");
    assert_eq!(entry.location, "s3://helio-public/FlythroughResults/");
    assert_eq!(entry.title, "Flythrough results from the SWMF_GM-run1 run.");
    assert!(entry.description.contains("MMS1 trajectory"));
    assert!(entry.citation.starts_with(KAMODO_CCMC_CITATION));
    assert_eq!(entry.file_format, vec![FileFormat::Netcdf4]);
}

#[test]
fn flythrough_registry_needs_files() {
    let (_temp, root) = temp_root();
    let app = app_in(&root, MockBounds::default(), MockPublication::default());
    let empty = root.join("empty");
    fs::create_dir_all(&empty).unwrap();

    let err = app
        .registry_flythrough(
            &"SWMF_GM".parse().unwrap(),
            &"run1".parse().unwrap(),
            FlythroughFiles::Directory {
                dir: empty,
                extension: "csv".to_string(),
            },
            None,
        )
        .unwrap_err();
    assert_matches!(err, CatalogError::MissingUpstreamInput(_));
}

#[test]
fn registry_rejects_unknown_model() {
    let (_temp, root) = temp_root();
    let app = app_in(&root, MockBounds::default(), MockPublication::default());

    let err = app
        .registry_model(
            &"NotAModel".parse().unwrap(),
            &"run1".parse().unwrap(),
            &"s3://helio/ModelOutputs/run1/".parse().unwrap(),
        )
        .unwrap_err();
    assert_matches!(err, CatalogError::UnknownModel(_));
}

#[test]
fn formats_lists_builtin_table() {
    let (_temp, root) = temp_root();
    let app = app_in(&root, MockBounds::default(), MockPublication::default());

    let formats = app.formats();
    let gitm = formats.models.iter().find(|m| m.model == "GITM").unwrap();
    assert_eq!(gitm.formats, vec!["netcdf4", "txt"]);
    assert_eq!(formats.flythrough, vec!["netcdf4"]);
}

#[test]
fn crossings_from_trajectory_file() {
    let (_temp, root) = temp_root();
    let app = app_in(&root, MockBounds::default(), MockPublication::default());
    let path = root.join("pass.csv");
    fs::write(
        &path,
        "time,x,y,z,bz,dp\n\
         2019-05-01T00:00:00Z,15.0,0.0,0.0,0.0,2.0\n\
         2019-05-01T01:00:00Z,5.0,0.0,0.0,0.0,2.0\n\
         2019-05-01T02:00:00Z,4.0,0.0,0.0,0.0,2.0\n",
    )
    .unwrap();

    let result = app.crossings(&path).unwrap();
    assert_eq!(result.samples, 3);
    assert_eq!(result.crossings.len(), 1);
    assert_eq!(result.crossings[0].index, 0);
    assert_eq!(result.crossings[0].time, "2019-05-01T00:00:00Z");
    assert!(!result.crossings[0].outbound);
}

#[test]
fn malformed_catalog_is_reported() {
    let (_temp, root) = temp_root();
    let app = app_in(&root, MockBounds::default(), MockPublication::default());
    app.store().ensure_output_root().unwrap();
    fs::write(app.store().catalog_path(), "{\"catalog\": [").unwrap();

    let err = app
        .catalog_model(&model_request("GITM", None), CatalogOptions::default())
        .unwrap_err();
    assert_matches!(err, CatalogError::MalformedCatalog(_));
    assert_eq!(
        fs::read_to_string(app.store().catalog_path()).unwrap(),
        "{\"catalog\": ["
    );
}
