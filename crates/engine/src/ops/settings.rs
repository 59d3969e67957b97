use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, TransactionTrait};
use tracing::info;

use crate::{OpContext, ResultEngine, SystemConfig, config};

use super::{Engine, load_config, with_tx};

impl Engine {
    /// The business configuration currently in force.
    pub async fn system_config(&self) -> ResultEngine<SystemConfig> {
        load_config(&self.database).await
    }

    /// Validates and stores a new configuration. Operations already running
    /// keep the values they loaded.
    pub async fn update_config(
        &self,
        ctx: &OpContext,
        new_config: SystemConfig,
    ) -> ResultEngine<SystemConfig> {
        new_config.validate()?;
        let now = Utc::now();
        with_tx!(self, |db_tx| {
            let model =
                config::ActiveModel::from_config(&new_config, now, Some(ctx.actor.clone()))?;
            if config::Entity::find_by_id(config::SINGLETON_ID)
                .one(&db_tx)
                .await?
                .is_some()
            {
                model.update(&db_tx).await?;
            } else {
                model.insert(&db_tx).await?;
            }
            Ok(())
        })?;
        info!(actor = %ctx.actor, "system config updated");
        Ok(new_config)
    }
}
