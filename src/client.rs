// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::convert::TryFrom;
use std::time::SystemTime;

use crate::apdu::{Apdu, Response, StatusWord};
use crate::applet::{self, Capabilities};
use crate::calculate::{
    self, bulk_action, needs_touch_probe_workaround, BulkAction, DEFAULT_PERIOD,
};
use crate::command::{
    Calculate, CalculateAll, Command, Delete, Register, Rename, SetPassword, Validate,
};
use crate::credential::{Code, Credential, CredentialData};
use crate::oath::{Algorithm, Kind, Tag};
use crate::state::{DeviceIdentity, Phase, State};
use crate::tlv::{self, Tlv};
use crate::transport::{Connection, Session, Transport};
use crate::{base32, crypto, ensure, Error, Result, YUBICO_OATH_AID};

/// The options for the OATH client.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct Options {
    /// Send a probe before calculating touch credentials on firmware 4.2.0 to 4.2.6,
    /// which otherwise hangs (default: true).
    pub touch_workaround: bool,

    /// Case-insensitive part of the reader name picked by [`OathClient::connect_first`]
    /// (default: "yubico yubikey").
    pub reader_match: &'static str,
}

impl Options {
    /// Options from their parts
    pub const fn new(touch_workaround: bool, reader_match: &'static str) -> Self {
        Self {
            touch_workaround,
            reader_match,
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new(true, "yubico yubikey")
    }
}

/// Client of the OATH application on one connected device.
///
/// Every command is a blocking round trip, so the client takes `&mut self`
/// throughout and keeps no lock of its own.
#[derive(Debug)]
pub struct OathClient<S> {
    options: Options,
    state: State,
    connection: Connection<S>,
}

impl<S: Session> OathClient<S> {
    /// Wrap a session; nothing is sent until [`Self::select`]
    pub fn new(session: S, options: Options) -> Self {
        Self {
            options,
            state: State::default(),
            connection: Connection::new(session),
        }
    }

    /// Connect to `reader` and select the OATH application
    pub fn connect<T>(transport: &T, reader: &str, options: Options) -> Result<Self>
    where
        T: Transport<Session = S>,
    {
        let session = transport.connect(reader)?;
        let mut client = Self::new(session, options);
        client.select()?;
        Ok(client)
    }

    /// Connect to the first reader whose name contains [`Options::reader_match`]
    pub fn connect_first<T>(transport: &T, options: Options) -> Result<Self>
    where
        T: Transport<Session = S>,
    {
        let wanted = options.reader_match.to_lowercase();
        let readers = transport.list_readers()?;
        debug_now!("readers: {:?}", readers);
        let reader = readers
            .iter()
            .find(|reader| reader.to_lowercase().contains(&wanted))
            .ok_or_else(|| {
                Error::ConnectionFailed(format!("no reader matching {:?}", options.reader_match))
            })?;
        Self::connect(transport, reader, options)
    }

    /// Give the session back, discarding the session state
    pub fn into_session(self) -> S {
        self.connection.into_inner()
    }

    /// What the device reported on the last SELECT
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.state.identity_opt()
    }

    /// Where the session stands in the protocol
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    fn send(&mut self, command: Command<'_>) -> Result<Response> {
        self.state.identity()?;
        let apdu = Apdu::try_from(command)?;
        self.connection.send(&apdu)
    }

    // APDU: 00 A4 04 00 07 A0 00 00 05 27 21 01
    // SW:
    //      79 03 01 00 00
    //      71 08 26 9F 14 54 3A 0E C7 AC
    //      90 00
    /// Select the OATH application, starting a new session state
    pub fn select(&mut self) -> Result<&DeviceIdentity> {
        self.state.reset();
        let response = self.connection.select_applet(YUBICO_OATH_AID)?;
        let records = Tlv::parse_all(&response.data)?;
        let identity = DeviceIdentity::from_select(&records)?;
        info_now!(
            "selected OATH {} on {}, access code {}",
            identity.version,
            identity.device_id,
            if identity.challenge.is_some() { "set" } else { "not set" }
        );
        self.state.selected(identity);
        self.state.identity()
    }

    /// Prove knowledge of the access code, and check the device knows it too.
    ///
    /// Does nothing if the device did not ask for authentication. After a failure
    /// the device has rotated its challenge, so [`Self::select`] has to be called
    /// before another attempt.
    pub fn validate(&mut self, password: &str) -> Result {
        let identity = self.state.identity()?;
        let device_challenge = match &identity.challenge {
            Some(challenge) => challenge.clone(),
            None => {
                debug_now!("no access code set, nothing to validate");
                return Ok(());
            }
        };
        let key = crypto::derive_key(password, &identity.salt);
        let response = crypto::hmac_sha1(&*key, &device_challenge);
        let challenge = crypto::random_challenge()?;
        let expected = crypto::hmac_sha1(&*key, &challenge);

        let reply = match self.send(Command::Validate(Validate {
            response: &response,
            challenge: &challenge,
        })) {
            Ok(reply) => reply,
            Err(Error::UnexpectedStatus(status)) if status == StatusWord::INCORRECT_RESPONSE => {
                warn_now!("device rejected the access code");
                return Err(Error::AuthenticationFailed {
                    status: Some(status),
                });
            }
            Err(err) => return Err(err),
        };

        let records = Tlv::parse_all(&reply.data)?;
        let device_response = tlv::find(&records, Tag::Response)
            .ok_or(Error::ProtocolViolation("validate without response"))?;
        if !crypto::verify(&expected, &device_response.value) {
            warn_now!("device failed to prove the access code");
            return Err(Error::AuthenticationFailed { status: None });
        }

        self.state.authorized();
        info_now!("access code validated");
        Ok(())
    }

    /// Store a new credential, unless one with the same name exists
    pub fn put(&mut self, data: &CredentialData<'_>) -> Result {
        self.state.identity()?;
        data.validate()?;
        if self.list()?.iter().any(|credential| credential.name == data.name) {
            info_now!("credential {} already exists", data.name);
            return Err(Error::CredentialExists(data.name.into()));
        }

        let key = crypto::shorten_key(data.secret, data.algorithm);
        self.send(Command::Register(Register {
            label: data.name,
            kind: data.kind,
            algorithm: data.algorithm,
            digits: data.digits,
            key: &key,
            touch_required: data.touch_required,
            counter: data.counter,
        }))?;
        info_now!("stored {:?}", data);
        Ok(())
    }

    /// [`Self::put`] with the secret given as Base32 text
    pub fn put_base32(&mut self, secret: &str, data: CredentialData<'_>) -> Result {
        let secret = zeroize::Zeroizing::new(base32::decode(secret)?);
        self.put(&CredentialData {
            secret: &secret,
            ..data
        })
    }

    /// Delete the credential called `name`
    pub fn delete(&mut self, name: &str) -> Result {
        self.send(Command::Delete(Delete { label: name }))?;
        info_now!("deleted {}", name);
        Ok(())
    }

    /// Rename a credential, supported from firmware 5.3.1 on
    pub fn rename(&mut self, name: &str, new_name: &str) -> Result {
        self.send(Command::Rename(Rename {
            label: name,
            new_label: new_name,
        }))?;
        info_now!("renamed {} to {}", name, new_name);
        Ok(())
    }

    /// All credentials stored on the device
    pub fn list(&mut self) -> Result<Vec<Credential>> {
        let response = self.send(Command::ListCredentials)?;
        Tlv::parse_all(&response.data)?
            .iter()
            .map(|record| {
                ensure(
                    record.tag == Tag::NameList,
                    Error::ProtocolViolation("unexpected tag in list"),
                )?;
                Credential::from_list_entry(&record.value)
            })
            .collect()
    }

    fn format(credential: &Credential, truncated: &[u8]) -> Result<String> {
        let (digits, value) = calculate::parse_truncated(truncated)?;
        Ok(if credential.is_steam() && credential.kind == Kind::Totp {
            calculate::format_steam(value)
        } else {
            calculate::format_code(value, digits)
        })
    }

    /// Calculate the code of one credential at `time`, or now
    pub fn calculate(&mut self, credential: &Credential, time: Option<SystemTime>) -> Result<Code> {
        let version = self.state.identity()?.version;
        let seconds = calculate::unix_seconds(time.unwrap_or_else(SystemTime::now));
        let challenge = match credential.kind {
            Kind::Totp => calculate::time_challenge(seconds, credential.period()),
            // the device counts by itself
            Kind::Hotp => [0u8; 8],
            _ => return Err(Error::UnsupportedCredentialType),
        };

        if credential.touch_required
            && self.options.touch_workaround
            && needs_touch_probe_workaround(version)
        {
            debug_now!("probing before touch calculation on {}", version);
            // only the exchange matters, the device answers with an error status
            let probe = Apdu::try_from(Command::SendRemaining)?;
            self.connection.transmit_raw(&probe)?;
        }

        let response = self.send(Command::Calculate(Calculate {
            label: &credential.name,
            challenge: &challenge,
        }))?;
        let records = Tlv::parse_all(&response.data)?;
        let truncated = tlv::find(&records, Tag::TruncatedResponse).ok_or(
            Error::ProtocolViolation("calculate without truncated response"),
        )?;
        let value = Self::format(credential, &truncated.value)?;
        Ok(Code::new(credential.clone(), value, seconds))
    }

    // 71 <- Tag::Name
    //    12
    //       79 75 62 69 63 6F
    // 76 <- Tag::TruncatedResponse
    //    05
    //       06  <- digits
    //       5A D0 A7 CA <- dynamically truncated HMAC
    // 90 00
    /// Calculate the codes of all credentials in one exchange.
    ///
    /// Credentials requiring touch and HOTP credentials come back as placeholders
    /// without a value. TOTP credentials with another period, and Steam credentials,
    /// are calculated again one by one.
    pub fn calculate_all(&mut self, time: Option<SystemTime>) -> Result<Vec<Code>> {
        let now = time.unwrap_or_else(SystemTime::now);
        let seconds = calculate::unix_seconds(now);
        let challenge = calculate::time_challenge(seconds, DEFAULT_PERIOD);
        let response = self.send(Command::CalculateAll(CalculateAll {
            challenge: &challenge,
        }))?;

        let records = Tlv::parse_all(&response.data)?;
        ensure(
            records.len() % 2 == 0,
            Error::ProtocolViolation("odd number of records in calculate all"),
        )?;

        let mut codes = Vec::with_capacity(records.len() / 2);
        for pair in records.chunks_exact(2) {
            let (name, value) = (&pair[0], &pair[1]);
            ensure(
                name.tag == Tag::Name,
                Error::ProtocolViolation("calculate all entry without name"),
            )?;
            let name = String::from_utf8(name.value.clone())
                .map_err(|_| Error::ProtocolViolation("credential name is not UTF-8"))?;
            let kind = match value.tag {
                Tag::Hotp => Kind::Hotp,
                _ => Kind::Totp,
            };
            // the algorithm is not part of the bulk response
            let credential = Credential::new(name, kind, Algorithm::Sha1, value.tag == Tag::Touch);

            let code = match bulk_action(value.tag, &credential)? {
                BulkAction::Placeholder => Code::placeholder(credential, seconds),
                BulkAction::Recalculate => self.calculate(&credential, Some(now))?,
                BulkAction::Format => {
                    let formatted = Self::format(&credential, &value.value)?;
                    Code::new(credential, formatted, seconds)
                }
            };
            codes.push(code);
        }
        Ok(codes)
    }

    /// Set or change the access code
    pub fn set_code(&mut self, password: &str) -> Result {
        let key = crypto::derive_key(password, &self.state.identity()?.salt);
        let challenge = crypto::random_challenge()?;
        let response = crypto::hmac_sha1(&*key, &challenge);
        self.send(Command::SetPassword(SetPassword {
            kind: Kind::Totp,
            algorithm: Algorithm::Sha1,
            key: &*key,
            challenge: &challenge,
            response: &response,
        }))?;
        info_now!("access code set");
        Ok(())
    }

    /// Remove the access code
    pub fn clear_code(&mut self) -> Result {
        self.send(Command::ClearPassword)?;
        info_now!("access code removed");
        Ok(())
    }

    /// Delete all credentials and the access code, then select again
    /// to pick up the new salt.
    pub fn reset(&mut self) -> Result {
        self.send(Command::Reset)?;
        info_now!(":: reset over");
        self.select()?;
        Ok(())
    }

    /// Find out which applications the device carries.
    ///
    /// Probing selects other applications, so the OATH session state is lost.
    /// If the OATH application was selected before, it is selected again.
    pub fn probe_capabilities(&mut self) -> Result<Capabilities> {
        let was_selected = self.state.identity_opt().is_some();
        self.state.reset();
        let capabilities = applet::probe_applets(&mut self.connection)?;
        if was_selected {
            self.select()?;
        }
        Ok(capabilities)
    }
}
