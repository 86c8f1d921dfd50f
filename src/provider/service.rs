//! Thin typed layer over `ProviderClient` (spec §4.4).

use std::sync::Arc;

use tracing::instrument;

use super::client::ProviderClient;
use super::types::{Ack, CreateInstanceAck, CreateInstanceSpec, ProviderInstance};
use crate::cache::registry::CacheRegistry;
use crate::domain::error::{Error, ErrorKind};
use crate::domain::product::{Product, RegistryAuth, Template};

pub struct ProviderService {
    client: Arc<ProviderClient>,
    caches: Arc<CacheRegistry>,
}

impl ProviderService {
    pub fn new(client: Arc<ProviderClient>, caches: Arc<CacheRegistry>) -> Self {
        Self { client, caches }
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        product_name: &str,
        region: &str,
        request_id: &str,
    ) -> Result<Vec<Product>, Error> {
        let cache_key = format!("{product_name}:{region}");
        if let Some(products) = self.caches.products.get(&cache_key) {
            return Ok(products);
        }
        let path = format!("products?productName={product_name}&region={region}");
        let products: Vec<Product> = self.client.get(&path, request_id).await?;
        self.caches.products.set(cache_key, products.clone(), None);
        Ok(products)
    }

    #[instrument(skip(self))]
    pub async fn get_template(&self, id: &str, request_id: &str) -> Result<Template, Error> {
        if let Some(template) = self.caches.templates.get(&id.to_string()) {
            return Ok(template);
        }
        let template: Template = self.client.get(&format!("templates/{id}"), request_id).await?;
        self.caches.templates.set(id.to_string(), template.clone(), None);
        Ok(template)
    }

    #[instrument(skip(self))]
    pub async fn get_registry_auth(
        &self,
        auth_id: &str,
        request_id: &str,
    ) -> Result<RegistryAuth, Error> {
        let auths: Vec<RegistryAuth> = self.client.get("repository/auths", request_id).await?;
        auths
            .into_iter()
            .find(|a| a.id == auth_id)
            .ok_or_else(|| Error::new(ErrorKind::RegistryAuthNotFound, "registry auth not found"))
    }

    #[instrument(skip(self, spec))]
    pub async fn create_instance(
        &self,
        spec: &CreateInstanceSpec,
        request_id: &str,
    ) -> Result<CreateInstanceAck, Error> {
        self.client.post("instances", spec, request_id).await
    }

    #[instrument(skip(self))]
    pub async fn get_instance(
        &self,
        provider_instance_id: &str,
        request_id: &str,
    ) -> Result<ProviderInstance, Error> {
        self.client
            .get(&format!("instances/{provider_instance_id}"), request_id)
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_instances(&self, request_id: &str) -> Result<Vec<ProviderInstance>, Error> {
        self.client.get("instances", request_id).await
    }

    #[instrument(skip(self))]
    pub async fn start_instance(
        &self,
        provider_instance_id: &str,
        request_id: &str,
    ) -> Result<Ack, Error> {
        self.client
            .post(&format!("instances/{provider_instance_id}:start"), &(), request_id)
            .await
    }

    /// Wraps `startInstance` with an additional application-level retry
    /// gated by the circuit breaker, per spec §4.4.
    #[instrument(skip(self))]
    pub async fn start_instance_with_retry(
        &self,
        provider_instance_id: &str,
        request_id: &str,
    ) -> Result<Ack, Error> {
        const ATTEMPTS: u32 = 2;
        let mut last_err = None;
        for attempt in 0..ATTEMPTS {
            match self.start_instance(provider_instance_id, request_id).await {
                Ok(ack) => return Ok(ack),
                Err(err) if err.is_retryable() && attempt + 1 < ATTEMPTS => {
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.expect("loop always attempts at least once"))
    }

    #[instrument(skip(self))]
    pub async fn stop_instance(
        &self,
        provider_instance_id: &str,
        request_id: &str,
    ) -> Result<Ack, Error> {
        self.client
            .post(&format!("instances/{provider_instance_id}:stop"), &(), request_id)
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_instance(
        &self,
        provider_instance_id: &str,
        request_id: &str,
    ) -> Result<Ack, Error> {
        self.client
            .delete(&format!("instances/{provider_instance_id}"), request_id)
            .await
    }
}
