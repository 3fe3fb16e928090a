//! Pure conversion of connection parameters into rumqttc options

use crate::device::{AWS_IOT_MQTT_PORT, MQTTS_SCHEME};
use crate::options::{ConnectionParams, QualityOfService, MIN_KEEP_ALIVE};
use crate::tls::TlsError;
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::{mqttbytes::QoS, MqttOptions};
use rumqttc::{TlsConfiguration, Transport as RumqttcTransport};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// rumqttc transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Unsupported broker URL scheme '{0}', expected mqtts")]
    UnsupportedScheme(String),
    #[error("Keep-alive {0:?} is below the 5s minimum")]
    InvalidKeepAlive(Duration),
    #[error("SNI '{server_name}' differs from broker host '{host}'; rumqttc always sends the broker host")]
    ServerNameMismatch { server_name: String, host: String },
    #[error("TLS configuration failed: {0}")]
    Tls(#[from] TlsError),
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("No CONNACK received within {0:?}")]
    ConnectTimeout(Duration),
    #[error("Client already connected")]
    AlreadyConnected,
    #[error("Event loop consumed by an earlier connect attempt; create a new client")]
    EventLoopConsumed,
    #[error("Outstanding publishes not acknowledged within {0:?}")]
    AckTimeout(Duration),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Disconnect failed")]
    DisconnectFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Not connected")]
    NotConnected,
}

pub(crate) fn to_qos(qos: QualityOfService) -> QoS {
    match qos {
        QualityOfService::AtMostOnce => QoS::AtMostOnce,
        QualityOfService::AtLeastOnce => QoS::AtLeastOnce,
    }
}

/// Translate connection parameters into rumqttc MQTT v5 options
pub fn configure_mqtt_options(params: &ConnectionParams) -> Result<MqttOptions, MqttError> {
    let url = Url::parse(&params.broker_url)
        .map_err(|_| MqttError::InvalidBrokerUrl(params.broker_url.clone()))?;
    if url.scheme() != MQTTS_SCHEME {
        return Err(MqttError::UnsupportedScheme(url.scheme().to_string()));
    }

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(params.broker_url.clone()))?;
    let port = url.port().unwrap_or(AWS_IOT_MQTT_PORT);

    // rumqttc derives SNI from the broker host
    if params.tls.server_name != host {
        return Err(MqttError::ServerNameMismatch {
            server_name: params.tls.server_name.clone(),
            host: host.to_string(),
        });
    }

    // rumqttc asserts on shorter intervals
    if params.keep_alive < MIN_KEEP_ALIVE {
        return Err(MqttError::InvalidKeepAlive(params.keep_alive));
    }

    let mut mqtt_options = MqttOptions::new(params.client_id.clone(), host, port);
    mqtt_options.set_keep_alive(params.keep_alive);
    mqtt_options.set_clean_start(params.clean_start);
    mqtt_options.set_max_packet_size(params.max_packet_size);

    if let Some(credentials) = &params.credentials {
        mqtt_options.set_credentials(&credentials.username, &credentials.password);
    }

    if let Some(will) = &params.last_will {
        let lwt = LastWill::new(
            &will.topic,
            will.payload.clone(),
            to_qos(will.qos),
            will.retain,
            None,
        );
        mqtt_options.set_last_will(lwt);
    }

    let tls_config = params.tls.client_config()?;
    mqtt_options.set_transport(RumqttcTransport::tls_with_config(
        TlsConfiguration::Rustls(Arc::new(tls_config)),
    ));

    Ok(mqtt_options)
}
