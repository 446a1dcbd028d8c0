use {
    super::{
        correlator::Correlator,
        initiator::{Acknowledgement, Initiator},
    },
    crate::adapters::daraja::security::CertificateEncryptor,
    crate::config::{B2cSettings, DarajaConfig, StkSettings},
    crate::domain::{
        error::InitiationError,
        money::Amount,
        provider::SecretEncryptor,
        request::{B2cCommand, B2cRequest, StkPushRequest, StkTransactionType, TransactionRequest},
        transaction::TransactionKind,
    },
    std::sync::Arc,
};

/// Caller-supplied part of an STK push; the merchant side comes from config.
#[derive(Debug, Clone)]
pub struct StkPushParams {
    pub amount: Amount,
    /// `2547XXXXXXXX`
    pub phone_number: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

#[derive(Debug, Clone)]
pub struct DisbursementParams {
    pub amount: Amount,
    pub phone_number: String,
    pub command: B2cCommand,
    pub remarks: String,
    pub occasion: String,
}

struct B2cAccount {
    settings: B2cSettings,
    encryptor: Arc<dyn SecretEncryptor>,
}

/// Initiator bound to the configured merchant accounts.
pub struct PaymentGateway {
    initiator: Initiator,
    stk: Option<StkSettings>,
    b2c: Option<B2cAccount>,
}

impl PaymentGateway {
    pub fn new(
        initiator: Initiator,
        stk: Option<StkSettings>,
        b2c: Option<(B2cSettings, Arc<dyn SecretEncryptor>)>,
    ) -> Self {
        Self {
            initiator,
            stk,
            b2c: b2c.map(|(settings, encryptor)| B2cAccount {
                settings,
                encryptor,
            }),
        }
    }

    /// Loads the B2C certificate up front so a bad path fails at startup.
    pub fn from_config(
        config: &DarajaConfig,
        correlator: Arc<Correlator>,
    ) -> Result<Self, InitiationError> {
        let initiator = Initiator::from_config(config, correlator)?;
        let b2c = match &config.b2c {
            Some(settings) => {
                let encryptor: Arc<dyn SecretEncryptor> =
                    Arc::new(CertificateEncryptor::from_file(&settings.certificate_path)?);
                Some((settings.clone(), encryptor))
            }
            None => None,
        };

        tracing::info!(
            stk = config.stk.is_some(),
            b2c = b2c.is_some(),
            "payment gateway configured"
        );
        Ok(Self::new(initiator, config.stk.clone(), b2c))
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        self.initiator.correlator()
    }

    pub async fn stk_push(&self, params: StkPushParams) -> Result<Acknowledgement, InitiationError> {
        let stk = self
            .stk
            .as_ref()
            .ok_or(InitiationError::NotConfigured(TransactionKind::PushToPay))?;

        let request = TransactionRequest::PushToPay(StkPushRequest {
            business_short_code: stk.short_code.clone(),
            passkey: stk.passkey.clone(),
            transaction_type: StkTransactionType::CustomerPayBillOnline,
            amount: params.amount,
            party_a: params.phone_number.clone(),
            party_b: stk.short_code.clone(),
            phone_number: params.phone_number,
            callback_url: stk.callback_url.clone(),
            account_reference: params.account_reference,
            transaction_desc: params.transaction_desc,
        });
        self.initiator.initiate(request).await
    }

    /// The initiator password is encrypted per request.
    pub async fn disburse(
        &self,
        params: DisbursementParams,
    ) -> Result<Acknowledgement, InitiationError> {
        let account = self
            .b2c
            .as_ref()
            .ok_or(InitiationError::NotConfigured(TransactionKind::Disbursement))?;
        let settings = &account.settings;

        let request = TransactionRequest::Disbursement(B2cRequest {
            initiator_name: settings.initiator_name.clone(),
            security_credential: account.encryptor.encrypt(&settings.initiator_password)?,
            command_id: params.command,
            amount: params.amount,
            party_a: settings.short_code.clone(),
            party_b: params.phone_number,
            remarks: params.remarks,
            queue_timeout_url: settings.queue_timeout_url.clone(),
            result_url: settings.result_url.clone(),
            occasion: params.occasion,
        });
        self.initiator.initiate(request).await
    }
}
