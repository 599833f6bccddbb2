use csv::{QuoteStyle, WriterBuilder};

use crate::{
    error::{AppError, AppResult},
    models::RecommendedMovie,
};

const EXPORT_HEADER: &[u8] = b"Title,Genres,Year,Rating,Description\n";

/// Renders recommended movies as a CSV document
///
/// Every field is quoted with embedded quotes doubled, so a numeric-looking title or
/// description is still written as text. `Rating` is the movie's average rating with one
/// decimal; a missing year or description is left empty.
pub fn recommendations_csv(movies: &[RecommendedMovie]) -> AppResult<String> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .from_writer(EXPORT_HEADER.to_vec());

    for recommended in movies {
        let movie = &recommended.movie;
        writer
            .write_record([
                movie.title.clone(),
                movie.genres.join("; "),
                movie.release_year.map(|y| y.to_string()).unwrap_or_default(),
                format!("{:.1}", movie.average_rating),
                movie.description.clone().unwrap_or_default(),
            ])
            .map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))
}
