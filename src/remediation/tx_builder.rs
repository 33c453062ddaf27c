use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes};
use ethers::utils::id;

const CALL_AGREEMENT_SIG: &str = "callAgreement(address,bytes,bytes)";
const DELETE_FLOW_SIG: &str = "deleteFlow(address,address,address,bytes)";

/// Encodes the remediation call.
///
/// The protocol host exposes a generic `callAgreement` entry point; closing
/// a flow is the inner `deleteFlow` call on the constant flow agreement
/// contract, wrapped into the outer payload. Encoding is pure and
/// deterministic given the two contract addresses.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    host: Address,
    cfa: Address,
}

impl TransactionBuilder {
    pub fn new(host: Address, cfa: Address) -> Self {
        Self { host, cfa }
    }

    /// Host contract every encoded call targets.
    pub fn target(&self) -> Address {
        self.host
    }

    /// `callAgreement(cfa, deleteFlow(token, sender, receiver, 0x), 0x)`
    pub fn delete_flow_call(&self, token: Address, sender: Address, receiver: Address) -> Bytes {
        let inner = encode_call(
            DELETE_FLOW_SIG,
            &[
                Token::Address(token),
                Token::Address(sender),
                Token::Address(receiver),
                Token::Bytes(Vec::new()),
            ],
        );
        encode_call(
            CALL_AGREEMENT_SIG,
            &[
                Token::Address(self.cfa),
                Token::Bytes(inner),
                Token::Bytes(Vec::new()),
            ],
        )
        .into()
    }
}

/// 4-byte selector over the canonical signature, then the ABI-encoded body.
fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = id(signature).to_vec();
    data.extend(encode(args));
    data
}
