//! Atomic per-day counters for human-readable document numbers.

use crate::{
    entities::number_sequence::{self, Entity as NumberSequence},
    errors::ServiceError,
};
use chrono::NaiveDate;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};

/// Allocates the next number for `prefix` on `date`, formatted
/// `<PREFIX>-<YYYYMMDD>-<N>`.
///
/// The counter row is incremented with a guarded UPDATE inside the
/// caller's transaction, so two concurrent creations can never draw the
/// same number the way a count-then-format scheme would.
pub async fn next_number<C: ConnectionTrait>(
    db: &C,
    prefix: &str,
    date: NaiveDate,
) -> Result<String, ServiceError> {
    let day = date.format("%Y%m%d").to_string();

    let updated = NumberSequence::update_many()
        .col_expr(
            number_sequence::Column::Counter,
            Expr::col(number_sequence::Column::Counter).add(1),
        )
        .filter(number_sequence::Column::Prefix.eq(prefix))
        .filter(number_sequence::Column::Day.eq(day.clone()))
        .exec(db)
        .await
        .map_err(ServiceError::DatabaseError)?;

    let counter = if updated.rows_affected == 0 {
        // First allocation for this prefix/day.
        let row = number_sequence::ActiveModel {
            prefix: Set(prefix.to_string()),
            day: Set(day.clone()),
            counter: Set(1),
        };
        row.insert(db).await.map_err(ServiceError::DatabaseError)?;
        1
    } else {
        NumberSequence::find()
            .filter(number_sequence::Column::Prefix.eq(prefix))
            .filter(number_sequence::Column::Day.eq(day.clone()))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .map(|row| row.counter)
            .ok_or_else(|| {
                ServiceError::InternalError("number sequence row vanished mid-transaction".into())
            })?
    };

    Ok(format!("{}-{}-{}", prefix, day, counter))
}
