use chrono::Utc;
use sea_orm::{ActiveValue, TransactionTrait, prelude::*};
use tracing::info;

use crate::{EngineError, OpContext, ResultEngine, Wallet, users, wallets};

use super::{Engine, normalize_required, wallet_of, with_tx};

impl Engine {
    /// Creates a user together with its wallet. A user without a wallet never
    /// exists.
    pub async fn create_user(&self, ctx: &OpContext, username: &str) -> ResultEngine<Wallet> {
        let username = normalize_required(username, "username")?;
        let now = Utc::now();
        let wallet = with_tx!(self, |db_tx| {
            if users::Entity::find_by_id(username.clone())
                .one(&db_tx)
                .await?
                .is_some()
            {
                return Err(EngineError::ExistingKey(username.clone()));
            }
            users::ActiveModel {
                username: ActiveValue::Set(username.clone()),
                created_at: ActiveValue::Set(now),
            }
            .insert(&db_tx)
            .await?;

            let wallet = Wallet::new(username.clone(), now);
            wallets::ActiveModel::from(&wallet).insert(&db_tx).await?;
            Ok(wallet)
        })?;
        info!(user = %username, wallet = %wallet.id, actor = %ctx.actor, "user created");
        Ok(wallet)
    }

    /// Current state of a user's wallet.
    pub async fn wallet(&self, user: &str) -> ResultEngine<Wallet> {
        wallet_of(&self.database, user).await
    }
}
