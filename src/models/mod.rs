mod movie;
mod rating;
mod recommendation;
mod user;

pub use movie::{ItemAggregate, Movie, NewMovie};
pub use rating::{Rating, RatingEntry, Score, ScoreBounds, UpsertOutcome};
pub use recommendation::{
    ImportReport, RateRequest, RateResponse, RecommendationResponse, RecommendedMovie,
    RejectedRow, SimilarItemsResponse, SimilarMovie,
};
pub use user::{NewUser, User};

/// Identifier of a user
pub type UserId = i64;

/// Identifier of a rated item (a movie)
pub type ItemId = i64;
