use csv::{ReaderBuilder, StringRecord, Trim};

use crate::{
    engine::{Recommender, RetrainScheduler},
    error::{AppError, AppResult},
    models::{ImportReport, ItemId, RejectedRow, UserId},
};

/// A parsed `user_id,movie_id,rating` row
#[derive(Debug, Clone, Copy, PartialEq)]
struct RatingRow {
    user_id: UserId,
    movie_id: ItemId,
    rating: f64,
}

/// Upserts every rating in a `user_id,movie_id,rating` CSV document
///
/// A header row is optional. Rows that fail to parse, carry an out-of-range score or
/// reference an unknown user or movie are reported with their line number and skipped.
/// Store failures abort the import.
pub async fn import_ratings(
    recommender: &Recommender,
    scheduler: &RetrainScheduler,
    body: &str,
) -> AppResult<ImportReport> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(body.as_bytes());

    let mut report = ImportReport::default();

    for (index, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line());
                reject(&mut report, line, e.to_string());
                continue;
            }
        };
        let line = record.position().map_or(0, |p| p.line());

        if index == 0 && is_header(&record) {
            continue;
        }

        let row = match parse_row(&record) {
            Ok(row) => row,
            Err(reason) => {
                reject(&mut report, line, reason);
                continue;
            }
        };

        match recommender
            .upsert_rating(row.user_id, row.movie_id, row.rating)
            .await
        {
            Ok(_) => {
                report.imported += 1;
                scheduler.notify_rating();
            }
            Err(
                e @ (AppError::InvalidScore { .. }
                | AppError::UserNotFound(_)
                | AppError::ItemNotFound(_)
                | AppError::InvalidInput(_)),
            ) => reject(&mut report, line, e.to_string()),
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        imported = report.imported,
        rejected = report.rejected,
        "Rating import finished"
    );

    Ok(report)
}

fn reject(report: &mut ImportReport, line: u64, reason: String) {
    tracing::debug!(line, reason = %reason, "Rejected rating row");
    report.rejected += 1;
    report.errors.push(RejectedRow { line, reason });
}

/// A first row whose leading field is not an integer is taken as a header
fn is_header(record: &StringRecord) -> bool {
    record
        .get(0)
        .is_some_and(|field| field.parse::<i64>().is_err())
}

fn parse_row(record: &StringRecord) -> Result<RatingRow, String> {
    if record.len() != 3 {
        return Err(format!("expected 3 fields, found {}", record.len()));
    }

    let user_id = record[0]
        .parse::<UserId>()
        .map_err(|_| format!("invalid user_id '{}'", &record[0]))?;
    let movie_id = record[1]
        .parse::<ItemId>()
        .map_err(|_| format!("invalid movie_id '{}'", &record[1]))?;
    let rating = record[2]
        .parse::<f64>()
        .map_err(|_| format!("invalid rating '{}'", &record[2]))?;

    Ok(RatingRow {
        user_id,
        movie_id,
        rating,
    })
}
