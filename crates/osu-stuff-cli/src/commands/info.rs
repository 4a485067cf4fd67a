use std::path::PathBuf;

use osu_stuff_formats::{CatalogFile, DecodeOptions, Ruleset};
use serde::Serialize;

use crate::output::{
    OutputStyle, create_table, format_count_badge, format_key_value, header_cell, numeric_cell,
    print_json, print_section_header, regular_cell,
};
use crate::{CommandContext, read_file};

#[derive(Debug, Serialize)]
pub struct CatalogSummary {
    pub version: u32,
    pub folder_count: u32,
    pub account_unlocked: bool,
    pub player_name: Option<String>,
    pub permission: String,
    pub permission_id: u32,
    pub beatmaps: usize,
    pub beatmapsets: usize,
    pub rulesets: Vec<RulesetCount>,
}

#[derive(Debug, Serialize)]
pub struct RulesetCount {
    pub ruleset: String,
    pub beatmaps: usize,
}

impl CatalogSummary {
    pub fn from_catalog(catalog: &CatalogFile) -> Self {
        let rulesets = Ruleset::ALL
            .into_iter()
            .map(|ruleset| RulesetCount {
                ruleset: ruleset.to_string(),
                beatmaps: catalog
                    .records()
                    .iter()
                    .filter(|record| record.ruleset() == Some(ruleset))
                    .count(),
            })
            .collect();

        Self {
            version: catalog.version,
            folder_count: catalog.folder_count,
            account_unlocked: catalog.account_unlocked,
            player_name: catalog.player_name.clone(),
            permission: catalog.permission.label().to_string(),
            permission_id: catalog.permission.id(),
            beatmaps: catalog.len(),
            beatmapsets: catalog.beatmapsets().len(),
            rulesets,
        }
    }
}

pub fn handle(context: &CommandContext, db: Option<PathBuf>, strict: bool) -> anyhow::Result<()> {
    let path = context.library_file(db, "osu!.db")?;
    let options = if strict {
        DecodeOptions::strict()
    } else {
        DecodeOptions::lenient()
    };
    let catalog = CatalogFile::decode_with(&read_file(&path)?, options)?;
    let summary = CatalogSummary::from_catalog(&catalog);

    if context.format.is_json() {
        return print_json(&summary, context.format);
    }

    let style = OutputStyle::new();
    print_section_header(&path.display().to_string(), &style);
    println!("{}", format_key_value("Version", &summary.version.to_string(), &style));
    println!(
        "{}",
        format_key_value(
            "Player",
            summary.player_name.as_deref().unwrap_or("-"),
            &style
        )
    );
    println!(
        "{}",
        format_key_value(
            "Permission",
            &format!("{} ({})", summary.permission, summary.permission_id),
            &style
        )
    );
    println!(
        "{} {}",
        format_key_value("Beatmaps", &summary.beatmaps.to_string(), &style),
        format_count_badge(summary.beatmapsets, "set", &style)
    );

    let mut table = create_table(&style);
    table.set_header(vec![
        header_cell("Ruleset", &style),
        header_cell("Beatmaps", &style),
    ]);
    for count in &summary.rulesets {
        table.add_row(vec![
            regular_cell(&count.ruleset),
            numeric_cell(&count.beatmaps.to_string()),
        ]);
    }
    println!("{table}");

    Ok(())
}
