//! Per-contact running balance.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::{
    AtStep, BalanceUpdate, CrmError, CrmGateway, DealContext, Money, NewBalance, PaymentRecord,
    PipelineStep, StepError, ValidationError,
};

/// Audit line appended to the balance timeline
pub fn balance_comment(
    balance_title: &str,
    amount: Money,
    payment: &PaymentRecord,
    context: &DealContext,
) -> String {
    let account_number = payment
        .account_number
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("no number");
    let deal_title = context.deal_title().unwrap_or("untitled");

    format!(
        "Balance {} credited with {} for invoice {}, deal {}",
        balance_title, amount, account_number, deal_title
    )
}

pub struct BalanceLedger {
    gateway: Arc<dyn CrmGateway>,
}

impl BalanceLedger {
    #[must_use]
    pub fn new(gateway: Arc<dyn CrmGateway>) -> Self {
        Self { gateway }
    }

    /// Credit the payment amount to the contact's balance, creating the
    /// balance item on first use
    #[instrument(skip(self, payment, context), fields(payment_id = %payment.id, contact_id = ?context.contact_id))]
    pub async fn apply(
        &self,
        payment: &PaymentRecord,
        context: &DealContext,
    ) -> Result<BalanceUpdate, StepError> {
        let step = PipelineStep::ProcessBalance;
        let contact_id = context
            .contact_id
            .as_deref()
            .ok_or_else(|| StepError::missing_field(step, "contactId"))?;
        let amount = payment
            .amount()
            .ok_or_else(|| StepError::missing_field(step, "psSum"))?;

        let balances = self.gateway.find_balances(contact_id).await.at(step)?;
        if balances.len() > 1 {
            warn!(
                count = balances.len(),
                chosen_balance_id = %balances[0].id,
                "Contact has more than one balance item, crediting the first"
            );
        }
        let existing = balances.into_iter().next();

        let (balance_id, title, old_balance, new_balance, created) = match existing {
            Some(item) => {
                let old_balance = item.opportunity.unwrap_or(Money::ZERO);
                let new_balance = old_balance.checked_add(amount).ok_or_else(|| {
                    StepError::new(
                        step,
                        ValidationError::InvalidField {
                            field: "opportunity".to_string(),
                            message: format!("{} + {} is out of range", old_balance, amount),
                        },
                    )
                })?;
                self.gateway
                    .update_balance(&item.id, new_balance)
                    .await
                    .at(step)?;
                let title = item
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| context.contact_name.clone());
                (item.id, title, old_balance, new_balance, false)
            }
            None => {
                let balance = NewBalance {
                    title: context.contact_name.clone(),
                    owner_id: context.owner_id.clone(),
                    opportunity: amount,
                    contact_id: contact_id.to_string(),
                };
                let balance_id = self
                    .gateway
                    .create_balance(&balance)
                    .await
                    .at(step)?
                    .ok_or_else(|| {
                        StepError::new(
                            step,
                            CrmError::InvalidResponse(
                                "Balance ID not returned after creation".to_string(),
                            ),
                        )
                    })?;
                (balance_id, balance.title, Money::ZERO, amount, true)
            }
        };

        let comment = balance_comment(&title, amount, payment, context);
        let comment_posted = match self.gateway.add_balance_comment(&balance_id, &comment).await {
            Ok(()) => true,
            Err(e) => {
                warn!(balance_id = %balance_id, error = %e, "Failed to post balance comment");
                false
            }
        };

        info!(
            balance_id = %balance_id,
            old_balance = %old_balance,
            new_balance = %new_balance,
            created,
            "Balance credited"
        );

        Ok(BalanceUpdate {
            balance_id,
            title,
            old_balance,
            new_balance,
            payment_amount: amount,
            created,
            comment,
            comment_posted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Deal;
    use crate::test_utils::fixtures::{self, CONTACT_ID};
    use crate::test_utils::{CrmOperation, MockCrmGateway};
    use chrono::{Duration, Utc};

    fn context() -> DealContext {
        DealContext {
            deal_id: "9".into(),
            owner_id: "5".into(),
            contact_id: Some(CONTACT_ID.into()),
            contact_name: "Ivanov Ivan".into(),
            deal: fixtures::deal(),
        }
    }

    fn payment(minor: i64) -> PaymentRecord {
        fixtures::paid_payment("42", Money::from_minor(minor), Utc::now(), Duration::hours(1))
    }

    #[tokio::test]
    async fn test_creates_balance_on_first_payment() {
        let gateway = Arc::new(MockCrmGateway::new());
        let ledger = BalanceLedger::new(gateway.clone());

        let update = ledger.apply(&payment(150_000), &context()).await.unwrap();

        assert!(update.created);
        assert_eq!(update.old_balance, Money::ZERO);
        assert_eq!(update.new_balance, Money::from_minor(150_000));
        assert_eq!(update.title, "Ivanov Ivan");

        let balances = gateway.balances();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].contact_id, CONTACT_ID);
        assert_eq!(balances[0].opportunity, Money::from_minor(150_000));
        assert_eq!(gateway.comments()[0].0, update.balance_id);
    }

    #[tokio::test]
    async fn test_repeated_credits_are_exact() {
        let gateway = Arc::new(MockCrmGateway::new().with_balance(
            CONTACT_ID,
            "501",
            "Ivanov Ivan",
            "10.10".parse().unwrap(),
        ));
        let ledger = BalanceLedger::new(gateway.clone());

        for _ in 0..3 {
            ledger.apply(&payment(20), &context()).await.unwrap();
        }

        assert_eq!(gateway.balances()[0].opportunity.to_string(), "10.70");
        assert_eq!(gateway.call_count(CrmOperation::CreateBalance), 0);
    }

    #[tokio::test]
    async fn test_duplicate_balances_credit_the_first() {
        let gateway = Arc::new(
            MockCrmGateway::new()
                .with_balance(CONTACT_ID, "501", "Ivanov Ivan", Money::from_minor(1000))
                .with_balance(CONTACT_ID, "502", "Ivanov Ivan", Money::from_minor(7000)),
        );
        let ledger = BalanceLedger::new(gateway.clone());

        let update = ledger.apply(&payment(500), &context()).await.unwrap();

        assert_eq!(update.balance_id, "501");
        assert_eq!(update.new_balance, Money::from_minor(1500));
        let balances = gateway.balances();
        assert_eq!(balances[1].opportunity, Money::from_minor(7000));
        assert_eq!(gateway.call_count(CrmOperation::UpdateBalance), 1);
    }

    #[tokio::test]
    async fn test_overflowing_balance_is_rejected_without_update() {
        let gateway = Arc::new(MockCrmGateway::new().with_balance(
            CONTACT_ID,
            "501",
            "Ivanov Ivan",
            Money::from_minor(i64::MAX - 10),
        ));
        let ledger = BalanceLedger::new(gateway.clone());

        let err = ledger.apply(&payment(500), &context()).await.unwrap_err();

        assert_eq!(err.step, PipelineStep::ProcessBalance);
        assert_eq!(err.error.kind(), "validation_error");
        assert_eq!(gateway.call_count(CrmOperation::UpdateBalance), 0);
    }

    #[tokio::test]
    async fn test_comment_failure_is_not_fatal() {
        let gateway = Arc::new(
            MockCrmGateway::new()
                .with_balance(CONTACT_ID, "501", "Ivanov Ivan", Money::from_minor(1000))
                .failing_on(
                    CrmOperation::AddBalanceComment,
                    CrmError::Transport("reset".into()),
                ),
        );
        let ledger = BalanceLedger::new(gateway.clone());

        let update = ledger.apply(&payment(500), &context()).await.unwrap();

        assert!(!update.comment_posted);
        assert_eq!(update.new_balance, Money::from_minor(1500));
    }

    #[tokio::test]
    async fn test_comment_text() {
        let update = BalanceLedger::new(Arc::new(MockCrmGateway::new()))
            .apply(&payment(150_000), &context())
            .await
            .unwrap();
        assert_eq!(
            update.comment,
            "Balance Ivanov Ivan credited with 1500.00 for invoice 17/1, deal Order #17"
        );

        let mut bare = payment(100);
        bare.account_number = None;
        let untitled = DealContext {
            deal: Deal::default(),
            ..context()
        };
        assert_eq!(
            balance_comment("X", Money::from_minor(100), &bare, &untitled),
            "Balance X credited with 1.00 for invoice no number, deal untitled"
        );
    }

    #[tokio::test]
    async fn test_missing_contact_is_validation_error() {
        let context = DealContext {
            contact_id: None,
            ..context()
        };
        let err = BalanceLedger::new(Arc::new(MockCrmGateway::new()))
            .apply(&payment(100), &context)
            .await
            .unwrap_err();

        assert_eq!(err.step, PipelineStep::ProcessBalance);
        assert_eq!(err.error.kind(), "validation_error");
    }

    #[tokio::test]
    async fn test_missing_amount_is_validation_error() {
        let mut payment = payment(100);
        payment.sum = None;
        payment.ps_sum = None;

        let err = BalanceLedger::new(Arc::new(MockCrmGateway::new()))
            .apply(&payment, &context())
            .await
            .unwrap_err();

        assert_eq!(err.error.kind(), "validation_error");
    }

    #[tokio::test]
    async fn test_update_error_fails_step() {
        let gateway = MockCrmGateway::new()
            .with_balance(CONTACT_ID, "501", "Ivanov Ivan", Money::from_minor(1000))
            .failing_on(
                CrmOperation::UpdateBalance,
                CrmError::Api {
                    code: "ACCESS_DENIED".into(),
                    message: "Access denied".into(),
                },
            );

        let err = BalanceLedger::new(Arc::new(gateway))
            .apply(&payment(100), &context())
            .await
            .unwrap_err();

        assert_eq!(err.step, PipelineStep::ProcessBalance);
        assert_eq!(err.error.to_string(), "API error: Access denied");
    }

    #[tokio::test]
    async fn test_created_balance_without_id_fails() {
        let gateway = Arc::new(MockCrmGateway::new());
        gateway.set_omit_created_ids(true);

        let err = BalanceLedger::new(gateway)
            .apply(&payment(100), &context())
            .await
            .unwrap_err();

        assert_eq!(err.error.kind(), "invalid_response");
    }
}
