//! Named model slots and the default model pointer

use crate::error::{Result, ServiceError};
use crate::estimators::Estimator;
use crate::models::ModelList;
use crate::storage::{model_key, Db, DEFAULT_MODEL_KEY, MODEL_PREFIX};
use crate::words::{ADJECTIVES, FOODS};
use rand::seq::IndexedRandom;
use rand::Rng;

/// Draw an `adjective-food` slug
pub fn random_slug<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("plain");
    let food = FOODS.choose(rng).copied().unwrap_or("toast");
    format!("{}-{}", adjective, food)
}

/// Model registry backed by the shared storage handle
#[derive(Clone)]
pub struct ModelRegistry {
    db: Db,
}

impl ModelRegistry {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Store `model` and make it the default.
    ///
    /// Without a name, slugs are drawn until one is free. Returns the name
    /// the model was stored under.
    pub async fn add(&self, model: &Estimator, name: Option<String>) -> Result<String> {
        let name = match name {
            Some(name) => name,
            None => loop {
                let candidate = random_slug(&mut rand::rng());
                if !self.db.contains(&model_key(&candidate)).await? {
                    break candidate;
                }
            },
        };

        self.save(&name, model).await?;
        self.db.set_json(DEFAULT_MODEL_KEY, &name).await?;
        Ok(name)
    }

    /// Persist a model under an existing name without touching the default
    pub async fn save(&self, name: &str, model: &Estimator) -> Result<()> {
        self.db.set_json(&model_key(name), model).await?;
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Estimator> {
        self.db
            .get_json(&model_key(name))
            .await?
            .ok_or_else(|| ServiceError::UnknownModel(name.to_string()))
    }

    /// Remove a model; returns whether it existed.
    ///
    /// The default pointer is left as is, even when it names this model.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.db.delete(&model_key(name)).await?)
    }

    pub async fn default_name(&self) -> Result<Option<String>> {
        Ok(self.db.get_json(DEFAULT_MODEL_KEY).await?)
    }

    /// The explicit name if given, else the default model
    pub async fn resolve(&self, explicit: Option<&str>) -> Result<String> {
        match explicit {
            Some(name) => Ok(name.to_string()),
            None => self
                .default_name()
                .await?
                .ok_or(ServiceError::NoDefaultModel),
        }
    }

    pub async fn names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .db
            .keys()
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(MODEL_PREFIX).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    pub async fn list(&self) -> Result<ModelList> {
        Ok(ModelList {
            models: self.names().await?,
            default: self.default_name().await?,
        })
    }
}
