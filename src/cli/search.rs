use serde::Serialize;
use tabled::{Table, settings::Style};

use crate::{
    Res,
    cli::{App, ExitError, print_json},
    spotify::clamp_limit,
    types::{Track, TrackTableRow},
};

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    items: &'a [Track],
    limit: u32,
    count: usize,
}

pub async fn search_tracks(app: &App, terms: &[String], limit: u32, json: bool) -> Res<()> {
    let query = terms.join(" ");
    if query.trim().is_empty() {
        return Err(ExitError::usage("search requires a query").into());
    }

    let client = app.client().await?;
    let limit = clamp_limit(limit);
    let items = client.search_tracks(&app.cancel, &query, limit).await?;

    if json {
        return print_json(&SearchOutput {
            query: &query,
            items: &items,
            limit,
            count: items.len(),
        });
    }

    if items.is_empty() {
        println!("(no results)");
        return Ok(());
    }
    let rows: Vec<TrackTableRow> = items.iter().map(TrackTableRow::from).collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}
