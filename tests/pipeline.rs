use data_sweeper::chart::bar_chart;
use data_sweeper::chart::ChartError;
use data_sweeper::cleaning::fill_missing;
use data_sweeper::cleaning::remove_duplicates;
use data_sweeper::export::convert;
use data_sweeper::export::ConversionTarget;
use data_sweeper::session::Event;
use data_sweeper::session::Message;
use data_sweeper::session::Session;
use data_sweeper::session::UploadOutcome;
use data_sweeper::spreadsheet::read_table;
use data_sweeper::spreadsheet::UploadedFile;
use data_sweeper::table::ColumnType;
use data_sweeper::table::Table;
use data_sweeper::table::Value;
use std::fs;
use std::process::Command;

const SAMPLE: &[u8] = b"a,b,c,d\n1,2,,x\n1,2,3,x\n";

fn read(name: &str, bytes: &[u8]) -> Table {
    read_table(&UploadedFile::new(name, bytes.to_vec())).unwrap()
}

#[test]
fn end_to_end_clean_select_and_convert() {
    let table = read("sample.csv", SAMPLE);
    assert_eq!(table.height(), 2);

    let (table, removed) = remove_duplicates(&table);
    assert_eq!(removed, 0);

    let (table, report) = fill_missing(&table);
    assert_eq!(report.cells(), 1);
    assert_eq!(table.rows()[0][2], Value::Float(3.0));

    let selected = table.select(&["a", "c"]).unwrap();
    let expected = vec![
        vec![Value::Int(1), Value::Float(3.0)],
        vec![Value::Int(1), Value::Float(3.0)],
    ];
    assert_eq!(selected.rows(), &expected[..]);

    let artifact = convert(&selected, "sample.csv", ConversionTarget::Spreadsheet).unwrap();
    assert_eq!(artifact.file_name, "sample.xlsx");
    let reread = read(&artifact.file_name, &artifact.bytes);
    assert_eq!(reread.column_names(), vec!["a", "c"]);
    assert_eq!(reread.rows(), &expected[..]);
}

#[test]
fn session_runs_the_same_pipeline() {
    let mut session = Session::new(5);
    let id = match session.upload(UploadedFile::new("sample.csv", SAMPLE.to_vec())) {
        UploadOutcome::Accepted { snapshot } => snapshot.id,
        UploadOutcome::Rejected { error, .. } => panic!("{error}"),
    };
    for event in [
        Event::SetCleaning { enabled: true },
        Event::RemoveDuplicates,
        Event::FillMissing,
        Event::SelectColumns { columns: vec!["a".to_owned(), "c".to_owned()] },
        Event::SetTarget { target: ConversionTarget::Csv },
        Event::Convert,
    ] {
        let snapshot = session.apply(id, event).unwrap();
        assert!(matches!(snapshot.message, Some(Message::Success(_))), "{:?}", snapshot.message);
    }
    let artifact = session.artifact(id).unwrap();
    assert_eq!(&*artifact.bytes, b"a,c\n1,3.0\n1,3.0\n");
}

#[test]
fn duplicate_removal_is_idempotent() {
    let table = read("dups.csv", b"k,v\n1,a\n2,b\n1,a\n,\n,\n2,b\n");
    let (once, removed) = remove_duplicates(&table);
    assert_eq!(removed, 3);
    assert_eq!(once.height(), 3);
    let (twice, removed) = remove_duplicates(&once);
    assert_eq!(removed, 0);
    assert_eq!(twice.rows(), once.rows());
}

#[test]
fn filled_values_equal_the_mean_and_others_are_untouched() {
    let table = read("gaps.csv", b"x,y,label\n1,0.5,a\n,1.5,\n4,,c\n");
    let (filled, _) = fill_missing(&table);
    assert_eq!(filled.rows()[1][0], Value::Float(2.5));
    assert_eq!(filled.rows()[2][1], Value::Float(1.0));
    assert_eq!(filled.rows()[0][0], Value::Float(1.0));
    assert_eq!(filled.rows()[0][1], Value::Float(0.5));
    assert_eq!(filled.rows()[1][2], Value::Null);
    assert_eq!(filled.columns()[0].kind, ColumnType::Double);
}

#[test]
fn selection_is_a_projection() {
    let table = read("wide.csv", b"a,b,c\n1,x,2.5\n3,y,4.5\n");
    let selected = table.select(&["c", "a"]).unwrap();
    assert_eq!(selected.column_names(), vec!["c", "a"]);
    assert_eq!(selected.height(), table.height());
    for (row, original) in selected.rows().iter().zip(table.rows()) {
        assert_eq!(row, &vec![original[2].clone(), original[0].clone()]);
    }
    assert!(table.select(&["a", "missing"]).is_err());
}

#[test]
fn csv_round_trip_preserves_content() {
    let table = read("mixed.csv", b"n,f,s,flag\n1,2.5,hello,true\n,3.0,\"a,b\",False\n7,,x,\n");
    let artifact = convert(&table, "mixed.csv", ConversionTarget::Csv).unwrap();
    let reread = read("mixed.csv", &artifact.bytes);
    assert_eq!(reread.columns(), table.columns());
    assert_eq!(reread.rows(), table.rows());
}

#[test]
fn chart_uses_the_first_two_numeric_columns() {
    let table = read("chart.csv", b"name,sales,cost,units\na,10,2.5,1\nb,20,,2\n");
    let chart = bar_chart(&table).unwrap();
    assert_eq!(chart.labels, vec![0, 1]);
    assert_eq!(chart.series[0].name, "sales");
    assert_eq!(chart.series[1].name, "cost");
    assert_eq!(chart.series[1].values, vec![Some(2.5), None]);

    let table = table.select(&["name", "units"]).unwrap();
    assert_eq!(bar_chart(&table), Err(ChartError::NotEnoughNumericColumns { found: 1 }));
}

#[test]
fn unsupported_files_are_rejected_per_file() {
    let mut session = Session::new(5);
    let outcomes = session.upload_all([
        UploadedFile::new("report.PDF", b"%PDF".to_vec()),
        UploadedFile::new("Sample.CSV", SAMPLE.to_vec()),
        UploadedFile::new("noextension", SAMPLE.to_vec()),
    ]);
    assert!(matches!(&outcomes[0], UploadOutcome::Rejected { error, .. } if error.ends_with("Unsupported file type: .pdf")));
    assert!(matches!(&outcomes[1], UploadOutcome::Accepted { .. }));
    assert!(matches!(&outcomes[2], UploadOutcome::Rejected { .. }));
    assert_eq!(session.snapshots().len(), 1);
}

#[test]
fn convert_command_writes_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("sample.csv");
    fs::write(&input, SAMPLE).unwrap();
    let out_dir = dir.path().join("out");

    let status = Command::new(env!("CARGO_BIN_EXE_data-sweeper"))
        .arg("convert")
        .arg(&input)
        .args(["--to", "xlsx", "--dedupe", "--fill-missing", "--columns", "a,c", "--out-dir"])
        .arg(&out_dir)
        .env("RUST_LOG", "warn")
        .status()
        .unwrap();
    assert!(status.success());

    let bytes = fs::read(out_dir.join("sample.xlsx")).unwrap();
    let table = read("sample.xlsx", &bytes);
    assert_eq!(table.column_names(), vec!["a", "c"]);
    assert_eq!(table.rows()[0], vec![Value::Int(1), Value::Float(3.0)]);

    let status = Command::new(env!("CARGO_BIN_EXE_data-sweeper"))
        .arg("convert")
        .arg(dir.path().join("missing.csv"))
        .env("RUST_LOG", "off")
        .status()
        .unwrap();
    assert!(!status.success());
}
