use clap::Args;

use crate::error::Result;
use crate::services::SimpleServices;

#[derive(Args)]
pub struct SearchArgs {
    /// Date (1977-05-08, 5/8/77, 1977-05, 1977), venue, taper or song title
    #[arg(value_name = "QUERY", required = true, num_args = 1..)]
    query: Vec<String>,

    /// Maximum number of shows to return
    #[arg(short, long, default_value = "20")]
    limit: usize,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: SearchArgs, services: &SimpleServices) -> Result<()> {
    let query = args.query.join(" ");
    let hits = services.factory().create_search_service().search(&query, args.limit).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("🔍 No shows match '{}'", query);
        println!("💡 Run 'deadarchive sync' or 'deadarchive import' if the catalog is empty");
        return Ok(());
    }

    println!("🔍 {} shows matching '{}'", hits.len(), query);
    println!("══════════════════════════════");
    for hit in &hits {
        let kinds: Vec<&str> = hit.matched.iter().map(|k| k.label()).collect();
        let rating = hit
            .show
            .rating
            .map(|r| format!("⭐ {:.2}", r))
            .unwrap_or_else(|| "unrated".to_string());
        println!(
            "{}  {:<45} {:>3} rec  {}  [{}]",
            hit.show.date,
            hit.show.venue_name,
            hit.show.recording_count,
            rating,
            kinds.join(", ")
        );
        println!("    {}", hit.show.show_id);
    }
    Ok(())
}
