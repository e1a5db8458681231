//! Recordings → shows
//!
//! Archive.org has one item per recording. A show is every recording made
//! on the same date at the same (normalized) venue.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::core::catalog::normalize::{normalize_date, parse_location, venue_slug, year_of, UNKNOWN_VENUE};
use crate::core::catalog::ratings::{aggregate_show_rating, best_recording, RecordingRating};
use crate::core::data::models::{Recording, Show, Venue};

#[derive(Debug, Default)]
pub struct GroupedCatalog {
    pub venues: Vec<Venue>,
    pub shows: Vec<Show>,
    /// Input recordings with `show_id` filled in
    pub recordings: Vec<Recording>,
    /// Recordings dropped for lack of a usable date
    pub skipped: usize,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Most common spelling; ties go to the longest, then alphabetical.
fn most_common<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(a, ca), (b, cb)| {
            ca.cmp(cb)
                .then(a.len().cmp(&b.len()))
                .then(b.cmp(a))
        })
        .map(|(v, _)| v.to_string())
}

pub fn group_into_shows(recordings: Vec<Recording>) -> GroupedCatalog {
    let mut skipped = 0;
    let mut dated: Vec<(String, Recording)> = Vec::with_capacity(recordings.len());

    for recording in recordings {
        match recording.date.as_deref().and_then(normalize_date) {
            Some(date) => dated.push((date, recording)),
            None => {
                warn!("Skipping {}: no usable date", recording.identifier);
                skipped += 1;
            }
        }
    }

    // (date, venue slug) -> recording indices
    let mut buckets: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
    let mut venueless: Vec<usize> = Vec::new();

    for (idx, (date, recording)) in dated.iter().enumerate() {
        match non_empty(&recording.venue) {
            Some(venue) => buckets
                .entry((date.clone(), venue_slug(venue)))
                .or_default()
                .push(idx),
            None => venueless.push(idx),
        }
    }

    for idx in venueless {
        let date = &dated[idx].0;
        let same_day: Vec<(String, String)> = buckets
            .keys()
            .filter(|(d, slug)| d == date && slug != UNKNOWN_VENUE)
            .cloned()
            .collect();

        let key = if same_day.len() == 1 {
            same_day.into_iter().next().unwrap_or_default()
        } else {
            (date.clone(), UNKNOWN_VENUE.to_string())
        };
        debug!("{} has no venue, filed under {}-{}", dated[idx].1.identifier, key.0, key.1);
        buckets.entry(key).or_default().push(idx);
    }

    let mut venues: BTreeMap<String, Venue> = BTreeMap::new();
    let mut shows = Vec::with_capacity(buckets.len());
    let mut show_ids: Vec<Option<String>> = vec![None; dated.len()];

    for ((date, slug), members) in &buckets {
        let group: Vec<&Recording> = members.iter().map(|&i| &dated[i].1).collect();

        let venue_name = most_common(group.iter().filter_map(|r| non_empty(&r.venue)))
            .unwrap_or_else(|| "Unknown Venue".to_string());
        let location = most_common(group.iter().filter_map(|r| non_empty(&r.location)));
        let show_id = format!("{}-{}", date, slug);

        let parsed = location.as_deref().map(parse_location).unwrap_or_default();
        let venue = venues.entry(slug.clone()).or_insert_with(|| Venue {
            venue_id: slug.clone(),
            name: venue_name.clone(),
            city: None,
            state: None,
            country: None,
            show_count: 0,
        });
        venue.city = venue.city.take().or(parsed.city);
        venue.state = venue.state.take().or(parsed.state);
        venue.country = venue.country.take().or(parsed.country);
        venue.show_count += 1;

        let ratings: Vec<RecordingRating> = group
            .iter()
            .map(|r| {
                RecordingRating::new(
                    r.identifier.clone(),
                    r.avg_rating.unwrap_or(0.0),
                    r.num_reviews,
                    r.source_type,
                )
            })
            .collect();
        let reviewed: Vec<RecordingRating> = ratings
            .iter()
            .filter(|r| r.review_count > 0 && r.rating > 0.0)
            .cloned()
            .collect();

        let (rating, rating_confidence) = match aggregate_show_rating(&reviewed) {
            Some((rating, confidence)) => (Some(rating), Some(confidence)),
            None => (None, None),
        };

        shows.push(Show {
            show_id: show_id.clone(),
            date: date.clone(),
            year: year_of(date).unwrap_or_default(),
            venue_id: slug.clone(),
            venue_name,
            location,
            recording_count: group.len() as i64,
            best_recording_id: best_recording(&ratings).map(|r| r.identifier.clone()),
            rating,
            rating_confidence,
            review_count: group.iter().map(|r| r.num_reviews).sum(),
        });

        for &i in members {
            show_ids[i] = Some(show_id.clone());
        }
    }

    let recordings = dated
        .into_iter()
        .zip(show_ids)
        .map(|((date, mut recording), show_id)| {
            recording.date = Some(date);
            recording.show_id = show_id;
            recording
        })
        .collect();

    GroupedCatalog {
        venues: venues.into_values().collect(),
        shows,
        recordings,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::models::SourceType;

    fn rec(id: &str, date: &str, venue: Option<&str>) -> Recording {
        let mut r = Recording::new(id);
        r.date = Some(date.to_string());
        r.venue = venue.map(String::from);
        r.location = Some("Ithaca, NY".to_string());
        r
    }

    #[test]
    fn test_variant_spellings_merge() {
        let grouped = group_into_shows(vec![
            rec("a", "1977-05-08", Some("Barton Hall, Cornell University")),
            rec("b", "1977-5-8", Some("Barton Hall - Cornell Univ.")),
            rec("c", "05/08/1977", Some("Barton Hall, Cornell University")),
        ]);

        assert_eq!(grouped.shows.len(), 1);
        assert_eq!(grouped.venues.len(), 1);
        let show = &grouped.shows[0];
        assert_eq!(show.show_id, "1977-05-08-barton-hall-cornell-university");
        assert_eq!(show.venue_name, "Barton Hall, Cornell University");
        assert_eq!(show.recording_count, 3);
        assert_eq!(show.year, 1977);
        assert!(grouped
            .recordings
            .iter()
            .all(|r| r.show_id.as_deref() == Some(show.show_id.as_str())));
        assert_eq!(grouped.venues[0].city.as_deref(), Some("Ithaca"));
        assert_eq!(grouped.venues[0].show_count, 1);
    }

    #[test]
    fn test_venueless_recording_joins_sole_show() {
        let grouped = group_into_shows(vec![
            rec("a", "1977-05-08", Some("Barton Hall")),
            rec("b", "1977-05-08", None),
        ]);
        assert_eq!(grouped.shows.len(), 1);
        assert_eq!(grouped.shows[0].recording_count, 2);
    }

    #[test]
    fn test_venueless_recording_with_ambiguous_day() {
        let grouped = group_into_shows(vec![
            rec("a", "1970-02-13", Some("Fillmore East")),
            rec("b", "1970-02-13", Some("Fillmore West")),
            rec("c", "1970-02-13", Some("   ")),
        ]);
        assert_eq!(grouped.shows.len(), 3);
        assert!(grouped
            .shows
            .iter()
            .any(|s| s.show_id == "1970-02-13-unknown-venue" && s.venue_name == "Unknown Venue"));
    }

    #[test]
    fn test_undated_recordings_are_skipped() {
        let grouped = group_into_shows(vec![
            rec("a", "sometime in 1977", Some("Barton Hall")),
            rec("b", "1977-05-08", Some("Barton Hall")),
        ]);
        assert_eq!(grouped.skipped, 1);
        assert_eq!(grouped.recordings.len(), 1);
    }

    #[test]
    fn test_best_recording_and_rating() {
        let mut sbd = rec("sbd", "1977-05-08", Some("Barton Hall"));
        sbd.source_type = SourceType::Sbd;
        sbd.avg_rating = Some(4.5);
        sbd.num_reviews = 8;

        let mut aud = rec("aud", "1977-05-08", Some("Barton Hall"));
        aud.source_type = SourceType::Aud;
        aud.avg_rating = Some(4.9);
        aud.num_reviews = 2;

        let unrated = rec("x", "1977-05-08", Some("Barton Hall"));

        let grouped = group_into_shows(vec![aud, unrated, sbd]);
        let show = &grouped.shows[0];
        assert_eq!(show.best_recording_id.as_deref(), Some("sbd"));
        assert_eq!(show.review_count, 10);
        assert_eq!(show.rating_confidence, Some(1.0));
        let rating = show.rating.unwrap();
        assert!(rating > 4.5 && rating < 4.9);
    }
}
