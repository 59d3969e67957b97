use chrono::Utc;
use sea_orm::{QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::debug;

use crate::{Notification, ResultEngine, notifications};

use super::{Engine, with_tx};

impl Engine {
    /// Outbox rows not yet handed to the delivery collaborator, oldest first.
    pub async fn undelivered_notifications(&self, limit: u64) -> ResultEngine<Vec<Notification>> {
        notifications::Entity::find()
            .filter(notifications::Column::DeliveredAt.is_null())
            .order_by_asc(notifications::Column::Id)
            .limit(limit)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Notification::try_from)
            .collect()
    }

    pub async fn notifications_for(&self, user: &str) -> ResultEngine<Vec<Notification>> {
        notifications::Entity::find()
            .filter(notifications::Column::UserId.eq(user))
            .order_by_asc(notifications::Column::Id)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Notification::try_from)
            .collect()
    }

    /// Marks rows delivered. Already delivered rows keep their first
    /// timestamp. Returns how many rows changed.
    pub async fn mark_notifications_delivered(&self, ids: &[i64]) -> ResultEngine<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let updated = with_tx!(self, |db_tx| {
            let result = notifications::Entity::update_many()
                .col_expr(notifications::Column::DeliveredAt, Expr::value(now))
                .filter(notifications::Column::Id.is_in(ids.iter().copied()))
                .filter(notifications::Column::DeliveredAt.is_null())
                .exec(&db_tx)
                .await?;
            Ok(result.rows_affected)
        })?;
        debug!(count = updated, "notifications delivered");
        Ok(updated)
    }
}
