mod common;
use common::*;

use billvision::Error;

#[test]
fn test_bill_label_map_end_to_end() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = write_file(dir.path(), "label_map.pbtxt", &label_map_text(&bill_entries(0)));

    let map = LabelMap::load(&path)?;
    assert_eq!(map.len(), 7);
    for (i, entry) in map.iter().enumerate() {
        assert_eq!(entry.name, LABEL_MAP_BILLS[i]);
        assert_eq!(entry.id, i as i64);
    }
    assert_eq!(map.get(6).map(|e| e.name.as_str()), Some("Five Dollar"));

    let labels = ClassLabels::from_label_map(&map);
    assert_eq!(labels.names(), LABEL_MAP_BILLS);
    Ok(())
}

#[test]
fn test_stanza_count_matches_entry_count() -> anyhow::Result<()> {
    for n in 0..=7 {
        let entries: Vec<(&str, i64)> = bill_entries(1).into_iter().take(n).collect();
        let map = LabelMap::parse(&label_map_text(&entries))?;
        assert_eq!(map.len(), n);
    }
    Ok(())
}

#[test]
fn test_label_map_written_back_parses_the_same() -> anyhow::Result<()> {
    let map = LabelMap::parse(&label_map_text(&bill_entries(1)))?;
    let again = LabelMap::parse(&map.to_pbtxt())?;
    assert_eq!(map, again);
    Ok(())
}

#[test]
fn test_missing_label_map_is_io_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let result = LabelMap::load(dir.path().join("absent.pbtxt"));
    assert!(matches!(result, Err(Error::Io { .. })));
}

#[test]
fn test_malformed_second_stanza_reports_position() {
    let text = format!(
        "{}\nitem {{\n  name \"Ten Dollar\",\n  id: 4,\n}}\n",
        stanza("One Dollar", 1)
    );
    match LabelMap::parse(&text) {
        Err(Error::Format { stanza, line, .. }) => {
            assert_eq!(stanza, 1);
            assert_eq!(line, 7);
        }
        other => panic!("expected a format error, got {:?}", other),
    }
}
