// ===============================
// src/corewriter.rs (CoreWriter helper, HyperEVM)
// ===============================
//
// Jalur on-chain ke Hyperliquid: kontrak helper di HyperEVM menerima harga
// dan size sebagai integer E8 (uint64), bukan string seperti /exchange.
// - placeIoc(assetId, isBuy, limitPxE8, szE8, reduceOnly)
// - approveBuilderFee(builder, maxFeeDeciBps), maks 10000 (10%)
//
use std::sync::Arc;

use ethers::abi::Detokenize;
use ethers::contract::{abigen, ContractCall};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer as _};
use ethers::types::{Address, Bytes, U64};
use tracing::info;

use crate::error::{Error, Result};
use crate::fixed::{is_valid_input, to_scaled};
use crate::morpho::{contract_err, parse_addr};

abigen!(
    CoreWriterHelper,
    r#"[
        function placeIoc(uint32 assetId, bool isBuy, uint64 limitPxE8, uint64 szE8, bool reduceOnly) external
        function approveBuilderFee(address builder, uint64 maxFeeDeciBps) external
        function getEncodedIOCAction(uint32 assetId, bool isBuy, uint64 limitPxE8, uint64 szE8, bool reduceOnly) external pure returns (bytes)
        function getEncodedBuilderFeeAction(address builder, uint64 maxFeeDeciBps) external pure returns (bytes)
    ]"#
);

/// 10000 deci-bps = 10%.
pub const MAX_FEE_DECI_BPS: u64 = 10_000;

pub type HyperEvmWriter = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Arguments of `placeIoc`, already in E8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IocParams {
    pub asset_id: u32,
    pub is_buy: bool,
    pub limit_px_e8: u64,
    pub sz_e8: u64,
    pub reduce_only: bool,
}

fn e8_u64(what: &str, value: &str) -> Result<u64> {
    if !is_valid_input(value) {
        return Err(Error::InvalidNumericInput(format!("{what} {value}")));
    }
    let scaled = to_scaled(value)?;
    if scaled == 0 {
        return Err(Error::InvalidOrderParameters(format!("{what} must be > 0")));
    }
    u64::try_from(scaled)
        .map_err(|_| Error::InvalidOrderParameters(format!("{what} {value} does not fit uint64 in E8")))
}

impl IocParams {
    pub fn new(asset_id: u32, is_buy: bool, price: &str, size: &str, reduce_only: bool) -> Result<Self> {
        Ok(Self {
            asset_id,
            is_buy,
            limit_px_e8: e8_u64("price", price)?,
            sz_e8: e8_u64("size", size)?,
            reduce_only,
        })
    }
}

pub fn check_fee_deci_bps(max_fee_deci_bps: u64) -> Result<u64> {
    if max_fee_deci_bps == 0 || max_fee_deci_bps > MAX_FEE_DECI_BPS {
        return Err(Error::InvalidOrderParameters(format!(
            "max fee {max_fee_deci_bps} deci-bps outside 1..={MAX_FEE_DECI_BPS}"
        )));
    }
    Ok(max_fee_deci_bps)
}

pub struct CoreWriterClient<M> {
    client: Arc<M>,
    helper: CoreWriterHelper<M>,
}

impl CoreWriterClient<HyperEvmWriter> {
    pub fn connect_signer(rpc_url: &str, wallet: LocalWallet, helper: &str, chain_id: u64) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| Error::Config(format!("rpc url {rpc_url}: {e}")))?;
        let signer = SignerMiddleware::new(provider, wallet.with_chain_id(chain_id));
        Self::new(Arc::new(signer), helper)
    }
}

impl<M: Middleware + 'static> CoreWriterClient<M> {
    pub fn new(client: Arc<M>, helper: &str) -> Result<Self> {
        let helper = CoreWriterHelper::new(parse_addr(helper)?, client.clone());
        Ok(Self { client, helper })
    }

    pub fn helper_address(&self) -> Address {
        self.helper.address()
    }

    fn ioc_call(&self, p: &IocParams) -> ContractCall<M, ()> {
        self.helper.place_ioc(p.asset_id, p.is_buy, p.limit_px_e8, p.sz_e8, p.reduce_only)
    }

    fn builder_fee_call(&self, builder: Address, max_fee_deci_bps: u64) -> Result<ContractCall<M, ()>> {
        let fee = check_fee_deci_bps(max_fee_deci_bps)?;
        Ok(self.helper.approve_builder_fee(builder, fee))
    }

    /// Calldata of `placeIoc` (dry-run: tidak dikirim).
    pub fn ioc_calldata(&self, p: &IocParams) -> Result<Bytes> {
        self.ioc_call(p)
            .calldata()
            .ok_or_else(|| Error::Signing("placeIoc: empty calldata".into()))
    }

    pub fn builder_fee_calldata(&self, builder: Address, max_fee_deci_bps: u64) -> Result<Bytes> {
        self.builder_fee_call(builder, max_fee_deci_bps)?
            .calldata()
            .ok_or_else(|| Error::Signing("approveBuilderFee: empty calldata".into()))
    }

    pub async fn ensure_chain(&self, expected: u64) -> Result<()> {
        let id = self
            .client
            .get_chainid()
            .await
            .map_err(|e| Error::NetworkFailure(format!("chain id: {e}")))?;
        if id.as_u64() != expected {
            return Err(Error::Config(format!("connected to chain {id}, expected HyperEVM {expected}")));
        }
        Ok(())
    }

    pub async fn place_ioc(&self, p: &IocParams) -> Result<String> {
        info!(asset = p.asset_id, buy = p.is_buy, px_e8 = p.limit_px_e8, sz_e8 = p.sz_e8, "corewriter placeIoc");
        self.send_and_confirm("placeIoc", self.ioc_call(p)).await
    }

    pub async fn approve_builder_fee(&self, builder: Address, max_fee_deci_bps: u64) -> Result<String> {
        let call = self.builder_fee_call(builder, max_fee_deci_bps)?;
        self.send_and_confirm("approveBuilderFee", call).await
    }

    async fn send_and_confirm<D: Detokenize>(&self, what: &str, call: ContractCall<M, D>) -> Result<String> {
        let pending = call.send().await.map_err(|e| contract_err(what, e))?;
        let hash = format!("{:#x}", pending.tx_hash());
        info!(what, tx = %hash, "tx sent");
        let receipt = pending
            .await
            .map_err(|e| Error::NetworkFailure(format!("{what} receipt: {e}")))?
            .ok_or_else(|| Error::VenueRejected(format!("{what}: tx {hash} dropped")))?;
        if receipt.status != Some(U64::from(1)) {
            return Err(Error::VenueRejected(format!("{what}: tx {hash} reverted")));
        }
        Ok(hash)
    }
}
