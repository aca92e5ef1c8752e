//! Shared-access-signature tokens for the Service Bus REST API.

use crate::queue::QueueError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign `resource_uri` with the shared access key, valid until `expiry` (unix seconds).
pub(crate) fn sas_token(
    resource_uri: &str,
    key_name: &str,
    key: &str,
    expiry: i64,
) -> Result<String, QueueError> {
    let encoded_uri = urlencoding::encode(&resource_uri.to_lowercase()).into_owned();
    let string_to_sign = format!("{encoded_uri}\n{expiry}");

    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|error| QueueError::InvalidConnectionString(error.to_string()))?;
    mac.update(string_to_sign.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    Ok(format!(
        "SharedAccessSignature sr={encoded_uri}&sig={}&se={expiry}&skn={key_name}",
        urlencoding::encode(&signature)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_known_signature() {
        let token = sas_token(
            "https://demo.servicebus.windows.net/openai_queue",
            "send",
            "c2VjcmV0",
            1_700_000_000,
        )
        .expect("token");

        assert_eq!(
            token,
            "SharedAccessSignature sr=https%3A%2F%2Fdemo.servicebus.windows.net%2Fopenai_queue\
             &sig=mXO%2BVwNCxInQbR%2FvBo5qpgcDTlO1ZeQN6nu2J6Z2Ht8%3D&se=1700000000&skn=send"
        );
    }
}
