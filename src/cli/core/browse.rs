use clap::Args;

use crate::core::catalog::normalize::normalize_date;
use crate::core::data::database::ShowFilter;
use crate::core::data::models::Show;
use crate::core::services::metadata::lock_db;
use crate::error::{DeadArchiveError, Result};
use crate::services::SimpleServices;

#[derive(Args)]
pub struct ShowsArgs {
    /// Only shows from this year
    #[arg(short, long)]
    year: Option<i32>,

    /// Venue name fragment
    #[arg(long)]
    venue: Option<String>,

    /// Minimum show rating
    #[arg(long)]
    min_rating: Option<f64>,

    #[arg(short, long, default_value = "50")]
    limit: usize,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Show id (1977-05-08-barton-hall-cornell-university) or a date
    #[arg(value_name = "SHOW")]
    show: String,

    /// Print as JSON
    #[arg(long)]
    json: bool,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_rating(show: &Show) -> String {
    match (show.rating, show.rating_confidence) {
        (Some(r), Some(c)) => format!("⭐ {:.2} ({:.0}% conf.)", r, c * 100.0),
        (Some(r), None) => format!("⭐ {:.2}", r),
        _ => "unrated".to_string(),
    }
}

pub async fn list(args: ShowsArgs, services: &SimpleServices) -> Result<()> {
    let filter = ShowFilter {
        year: args.year,
        venue: args.venue.clone(),
        min_rating: args.min_rating,
        limit: args.limit,
    };
    let shows = {
        let db = services.database()?;
        let db = lock_db(&db)?;
        db.list_shows(&filter)?
    };

    if args.json {
        return print_json(&shows);
    }
    if shows.is_empty() {
        println!("📭 No shows found");
        return Ok(());
    }

    println!("🎸 {} shows", shows.len());
    println!("══════════════");
    for show in &shows {
        println!(
            "{}  {:<45} {:>3} rec  {}",
            show.date,
            show.venue_name,
            show.recording_count,
            format_rating(show)
        );
    }
    Ok(())
}

pub async fn show(args: ShowArgs, services: &SimpleServices) -> Result<()> {
    let shared = services.database()?;
    let db = lock_db(&shared)?;

    let shows = match db.get_show(&args.show)? {
        Some(show) => vec![show],
        None => match normalize_date(&args.show) {
            Some(date) => db.shows_on_date(&date)?,
            None => Vec::new(),
        },
    };
    if shows.is_empty() {
        return Err(DeadArchiveError::NotFound(format!("show {}", args.show)));
    }

    if args.json {
        let mut details = Vec::new();
        for show in shows {
            let recordings = db.recordings_for_show(&show.show_id)?;
            details.push(serde_json::json!({ "show": show, "recordings": recordings }));
        }
        return print_json(&details);
    }

    for show in &shows {
        println!("🎸 {} at {}", show.date, show.venue_name);
        println!("══════════════════════════════");
        if let Some(location) = &show.location {
            println!("📍 {}", location);
        }
        println!("🆔 {}", show.show_id);
        println!("📊 {} ({} reviews)", format_rating(show), show.review_count);

        let recordings = db.recordings_for_show(&show.show_id)?;
        println!("\n📼 Recordings ({}):", recordings.len());
        for recording in &recordings {
            let best = if show.best_recording_id.as_deref() == Some(recording.identifier.as_str()) {
                "★"
            } else {
                " "
            };
            let rating = recording
                .weighted_rating
                .or(recording.avg_rating)
                .map(|r| format!("{:.2}", r))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {} {:<8} {:>5} ({:>3} reviews)  {}",
                best, recording.source_type, rating, recording.num_reviews, recording.identifier
            );
            if let Some(taper) = &recording.taper {
                println!("             taper: {}", taper);
            }
        }

        if let Some(best) = &show.best_recording_id {
            let tracks = db.tracks_for_recording(best)?;
            if !tracks.is_empty() {
                println!("\n🎵 Setlist from {}:", best);
                for track in &tracks {
                    let duration = track
                        .duration_seconds
                        .map(|d| format!("{}:{:02}", d as u64 / 60, d as u64 % 60))
                        .unwrap_or_default();
                    println!(
                        "  {:>2}. {:<40} {}",
                        track.track_number.unwrap_or_default(),
                        track.title.as_deref().unwrap_or(&track.filename),
                        duration
                    );
                }
            }
        }
        println!();
    }
    Ok(())
}
