// Copyright (C) 2023 Nitrokey GmbH
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Applications a YubiKey compatible token may carry, and probing for them.

use bitflags::bitflags;

use crate::transport::{Connection, Session};
use crate::{Error, Result};

bitflags! {
    /// Applications found on a device
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Capabilities: u16 {
        /// Yubico OTP slots
        const OTP = 0x01;
        /// FIDO U2F, either AID
        const U2F = 0x02;
        /// OpenPGP card
        const OPENPGP = 0x08;
        /// PIV
        const PIV = 0x10;
        /// OATH
        const OATH = 0x20;
    }
}

/// Known applications
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Applet {
    /// YKOATH
    Oath,
    /// Yubico OTP
    Otp,
    /// Management, carries no capability of its own
    Mgr,
    /// PIV
    Piv,
    /// FIDO U2F
    FidoU2f,
    /// Yubico's older U2F AID
    YubicoU2f,
    /// OpenPGP card
    OpenPgp,
}

impl Applet {
    /// All registered applications, in probing order
    pub const ALL: [Applet; 7] = [
        Applet::Oath,
        Applet::Otp,
        Applet::Mgr,
        Applet::Piv,
        Applet::FidoU2f,
        Applet::YubicoU2f,
        Applet::OpenPgp,
    ];

    /// Application identifier selecting the applet
    pub fn aid(self) -> &'static [u8] {
        match self {
            Applet::Oath => crate::YUBICO_OATH_AID,
            Applet::Otp => &hex!("A000000527 2001"),
            Applet::Mgr => &hex!("A000000527 471117"),
            Applet::Piv => &hex!("A000000308"),
            Applet::FidoU2f => &hex!("A000000647 2F0001"),
            Applet::YubicoU2f => &hex!("A000000527 1002"),
            Applet::OpenPgp => &hex!("D27600012401"),
        }
    }

    /// Capability the applet provides
    pub fn capability(self) -> Capabilities {
        match self {
            Applet::Oath => Capabilities::OATH,
            Applet::Otp => Capabilities::OTP,
            Applet::Mgr => Capabilities::empty(),
            Applet::Piv => Capabilities::PIV,
            Applet::FidoU2f | Applet::YubicoU2f => Capabilities::U2F,
            Applet::OpenPgp => Capabilities::OPENPGP,
        }
    }
}

/// Select every known applet in turn and collect the capabilities of those that answer.
///
/// A device refusing the SELECT means the applet is absent. Other failures are reported.
/// The previously selected applet is left deselected.
pub fn probe_applets<S: Session>(connection: &mut Connection<S>) -> Result<Capabilities> {
    let mut capabilities = Capabilities::empty();
    for applet in Applet::ALL {
        match connection.select_applet(applet.aid()) {
            Ok(_) => {
                debug_now!("found {:?}", applet);
                capabilities |= applet.capability();
            }
            Err(Error::UnexpectedStatus(_status)) => {
                debug_now!("no {:?}: {}", applet, _status);
            }
            Err(err) => return Err(err),
        }
    }
    info_now!("capabilities: {:?}", capabilities);
    Ok(capabilities)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answers SELECT only for the listed AIDs
    struct Applets(Vec<&'static [u8]>);

    impl Session for Applets {
        fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>> {
            let aid = &command[5..command.len() - 1];
            if self.0.iter().any(|known| *known == aid) {
                Ok(hex!("90 00").to_vec())
            } else {
                Ok(hex!("6A 82").to_vec())
            }
        }
    }

    #[test]
    fn aids() {
        assert_eq!(Applet::Oath.aid(), hex!("A0 00 00 05 27 21 01 01"));
        assert_eq!(Applet::Otp.aid(), hex!("A0 00 00 05 27 20 01"));
        assert_eq!(Applet::Mgr.aid(), hex!("A0 00 00 05 27 47 11 17"));
        assert_eq!(Applet::Piv.aid(), hex!("A0 00 00 03 08"));
        assert_eq!(Applet::FidoU2f.aid(), hex!("A0 00 00 06 47 2F 00 01"));
        assert_eq!(Applet::YubicoU2f.aid(), hex!("A0 00 00 05 27 10 02"));
        assert_eq!(Applet::OpenPgp.aid(), hex!("D2 76 00 01 24 01"));
    }

    #[test]
    fn absent_applets_are_skipped() {
        let mut connection = Connection::new(Applets(vec![
            Applet::Oath.aid(),
            Applet::Mgr.aid(),
            Applet::YubicoU2f.aid(),
        ]));
        assert_eq!(
            probe_applets(&mut connection).unwrap(),
            Capabilities::OATH | Capabilities::U2F
        );
    }

    #[test]
    fn transport_failures_are_fatal() {
        struct Broken;
        impl Session for Broken {
            fn transmit(&mut self, _: &[u8]) -> Result<Vec<u8>> {
                Err(Error::TransportFailure("unplugged".into()))
            }
        }
        assert!(matches!(
            probe_applets(&mut Connection::new(Broken)),
            Err(Error::TransportFailure(_))
        ));
    }
}
