//! Resolves the deal, owner and contact behind a payment.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::{
    AtStep, Contact, CrmGateway, DealContext, PaymentRecord, PipelineStep, StepError,
};

/// Display name built from the contact's surname, given name and patronymic.
///
/// Empty parts are skipped and whitespace is collapsed; a contact with no
/// usable parts gets `placeholder`.
pub fn assemble_contact_name(contact: &Contact, placeholder: &str) -> String {
    let name = [&contact.last_name, &contact.name, &contact.second_name]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");

    if name.is_empty() {
        placeholder.to_string()
    } else {
        name
    }
}

pub struct DealResolver {
    gateway: Arc<dyn CrmGateway>,
    default_owner_id: String,
    contact_placeholder: String,
}

impl DealResolver {
    #[must_use]
    pub fn new(
        gateway: Arc<dyn CrmGateway>,
        default_owner_id: impl Into<String>,
        contact_placeholder: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            default_owner_id: default_owner_id.into(),
            contact_placeholder: contact_placeholder.into(),
        }
    }

    /// Walk payment → order entity → deal → contact
    #[instrument(skip(self, payment), fields(payment_id = %payment.id))]
    pub async fn resolve(&self, payment: &PaymentRecord) -> Result<DealContext, StepError> {
        let order_id = payment
            .order_id
            .as_deref()
            .ok_or_else(|| StepError::missing_field(PipelineStep::GetOrderEntity, "orderId"))?;

        let entity = self
            .gateway
            .find_order_entities(order_id)
            .await
            .at(PipelineStep::GetOrderEntity)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                StepError::not_found(
                    PipelineStep::GetOrderEntity,
                    format!("Order entity not found for order {}", order_id),
                )
            })?;

        let deal_id = entity
            .owner_id
            .ok_or_else(|| StepError::missing_field(PipelineStep::GetOrderEntity, "ownerId"))?;

        let deal = self
            .gateway
            .get_deal(&deal_id)
            .await
            .at(PipelineStep::GetDeal)?
            .ok_or_else(|| {
                StepError::not_found(PipelineStep::GetDeal, format!("Deal {} not found", deal_id))
            })?;

        let contact_name = match deal.contact_id.as_deref() {
            Some(contact_id) => self.contact_name(contact_id).await,
            None => self.contact_placeholder.clone(),
        };

        let owner_id = deal
            .assigned_by_id
            .clone()
            .unwrap_or_else(|| self.default_owner_id.clone());

        info!(deal_id = %deal_id, owner_id = %owner_id, contact_id = ?deal.contact_id, "Deal resolved");
        Ok(DealContext {
            deal_id,
            owner_id,
            contact_id: deal.contact_id.clone(),
            contact_name,
            deal,
        })
    }

    /// Best effort: any lookup problem yields the placeholder
    async fn contact_name(&self, contact_id: &str) -> String {
        match self.gateway.get_contact(contact_id).await {
            Ok(Some(contact)) => assemble_contact_name(&contact, &self.contact_placeholder),
            Ok(None) => {
                warn!(contact_id = %contact_id, "Contact not found, using placeholder name");
                self.contact_placeholder.clone()
            }
            Err(e) => {
                warn!(contact_id = %contact_id, error = %e, "Contact lookup failed, using placeholder name");
                self.contact_placeholder.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AppError, CrmError, Deal, Money};
    use crate::test_utils::fixtures::{self, CONTACT_ID, DEAL_ID, ORDER_ID, OWNER_ID};
    use crate::test_utils::{CrmOperation, MockCrmGateway};
    use chrono::{Duration, Utc};

    fn contact(last: &str, first: &str, middle: &str) -> Contact {
        let part = |s: &str| Some(s.to_string());
        Contact {
            last_name: part(last),
            name: part(first),
            second_name: part(middle),
        }
    }

    fn payment() -> PaymentRecord {
        fixtures::paid_payment("42", Money::from_minor(100), Utc::now(), Duration::hours(1))
    }

    fn resolver(gateway: MockCrmGateway) -> DealResolver {
        DealResolver::new(Arc::new(gateway), "1", "Client")
    }

    #[test]
    fn test_contact_name_joins_non_empty_parts() {
        assert_eq!(
            assemble_contact_name(&contact("Ivanov", "Ivan", "Petrovich"), "Client"),
            "Ivanov Ivan Petrovich"
        );
        assert_eq!(
            assemble_contact_name(&contact("Ivanov", "", "Petrovich"), "Client"),
            "Ivanov Petrovich"
        );
        assert_eq!(
            assemble_contact_name(&contact("  Ivanov ", " Ivan", ""), "Client"),
            "Ivanov Ivan"
        );
        assert_eq!(
            assemble_contact_name(&Contact { name: Some("Ivan".into()), ..Default::default() }, "Client"),
            "Ivan"
        );
    }

    #[test]
    fn test_contact_name_placeholder_when_empty() {
        assert_eq!(assemble_contact_name(&contact("", " ", ""), "Client"), "Client");
        assert_eq!(assemble_contact_name(&Contact::default(), "Client"), "Client");
    }

    #[tokio::test]
    async fn test_full_resolution() {
        let gateway = fixtures::resolvable_gateway(Money::from_minor(100), Utc::now());

        let context = resolver(gateway).resolve(&payment()).await.unwrap();

        assert_eq!(context.deal_id, DEAL_ID);
        assert_eq!(context.owner_id, OWNER_ID);
        assert_eq!(context.contact_id.as_deref(), Some(CONTACT_ID));
        assert_eq!(context.contact_name, "Ivanov Ivan Petrovich");
        assert_eq!(context.deal_title(), Some("Order #17"));
    }

    #[tokio::test]
    async fn test_owner_falls_back_to_default() {
        let deal = Deal {
            assigned_by_id: None,
            ..fixtures::deal()
        };
        let gateway = MockCrmGateway::new()
            .with_order_entity(ORDER_ID, DEAL_ID)
            .with_deal(DEAL_ID, deal)
            .with_contact(CONTACT_ID, fixtures::contact());

        let context = resolver(gateway).resolve(&payment()).await.unwrap();

        assert_eq!(context.owner_id, "1");
    }

    #[tokio::test]
    async fn test_contact_failure_uses_placeholder() {
        let gateway = fixtures::resolvable_gateway(Money::from_minor(100), Utc::now())
            .failing_on(CrmOperation::GetContact, CrmError::Transport("reset".into()));

        let context = resolver(gateway).resolve(&payment()).await.unwrap();

        assert_eq!(context.contact_name, "Client");
        assert_eq!(context.contact_id.as_deref(), Some(CONTACT_ID));
    }

    #[tokio::test]
    async fn test_missing_order_id() {
        let mut payment = payment();
        payment.order_id = None;

        let err = resolver(MockCrmGateway::new()).resolve(&payment).await.unwrap_err();

        assert_eq!(err.step, PipelineStep::GetOrderEntity);
        assert_eq!(err.error.kind(), "validation_error");
    }

    #[tokio::test]
    async fn test_empty_order_entity_list() {
        let err = resolver(MockCrmGateway::new())
            .resolve(&payment())
            .await
            .unwrap_err();

        assert_eq!(err.step, PipelineStep::GetOrderEntity);
        assert!(matches!(err.error, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_order_without_deal_link() {
        let gateway = MockCrmGateway::new().with_unbound_order(ORDER_ID);

        let err = resolver(gateway).resolve(&payment()).await.unwrap_err();

        assert_eq!(err.step, PipelineStep::GetOrderEntity);
        assert_eq!(err.error.kind(), "validation_error");
    }

    #[tokio::test]
    async fn test_missing_deal() {
        let gateway = MockCrmGateway::new().with_order_entity(ORDER_ID, DEAL_ID);

        let err = resolver(gateway).resolve(&payment()).await.unwrap_err();

        assert_eq!(err.step, PipelineStep::GetDeal);
        assert!(matches!(err.error, AppError::NotFound(_)));
    }
}
