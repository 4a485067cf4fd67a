use std::path::PathBuf;

use osu_stuff_formats::CollectionsFile;
use serde::Serialize;

use crate::output::{
    OutputStyle, create_table, format_count_badge, header_cell, numeric_cell, print_json,
    print_section_header, regular_cell,
};
use crate::{CommandContext, read_file};

#[derive(Debug, Serialize)]
struct CollectionRow<'a> {
    name: &'a str,
    beatmaps: usize,
}

pub fn handle(context: &CommandContext, path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = context.library_file(path, "collection.db")?;
    let file = CollectionsFile::decode(&read_file(&path)?)?;

    let rows: Vec<CollectionRow<'_>> = file
        .collections
        .iter()
        .map(|collection| CollectionRow {
            name: collection.name(),
            beatmaps: collection.len(),
        })
        .collect();

    if context.format.is_json() {
        return print_json(
            &serde_json::json!({ "version": file.version, "collections": rows }),
            context.format,
        );
    }

    let style = OutputStyle::new();
    print_section_header(
        &format!(
            "{} {}",
            path.display(),
            format_count_badge(rows.len(), "collection", &style)
        ),
        &style,
    );

    let mut table = create_table(&style);
    table.set_header(vec![
        header_cell("Collection", &style),
        header_cell("Beatmaps", &style),
    ]);
    for row in &rows {
        table.add_row(vec![
            regular_cell(row.name),
            numeric_cell(&row.beatmaps.to_string()),
        ]);
    }
    println!("{table}");

    Ok(())
}
