//! Morpho contracts
//!
//! Only the functions and events the adapters call. [`Market`] and [`MarketParams`]
//! are declared once and shared by every interface, so values read from `IMorpho`
//! can be handed to `IIrm` as they are.

use alloy::{
    primitives::{B256, keccak256},
    sol,
    sol_types::SolValue,
};

use crate::math::morpho::MarketState;

sol! {
    #[derive(Debug, Default, PartialEq, Eq)]
    struct Market {
        uint128 totalSupplyAssets;
        uint128 totalSupplyShares;
        uint128 totalBorrowAssets;
        uint128 totalBorrowShares;
        uint128 lastUpdate;
        uint128 fee;
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    struct MarketParams {
        address loanToken;
        address collateralToken;
        address oracle;
        address irm;
        uint256 lltv;
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    struct Position {
        uint256 supplyShares;
        uint128 borrowShares;
        uint128 collateral;
    }

    #[derive(Debug, Default, PartialEq, Eq)]
    struct MarketConfig {
        uint184 cap;
        bool enabled;
        uint64 removableAt;
    }

    #[sol(rpc)]
    interface IMorpho {
        function idToMarketParams(bytes32 id) external view returns (MarketParams memory);
        function market(bytes32 id) external view returns (Market memory);
        function position(bytes32 id, address user) external view returns (Position memory);

        event Supply(
            bytes32 indexed id,
            address indexed caller,
            address indexed onBehalf,
            uint256 assets,
            uint256 shares
        );
        event Withdraw(
            bytes32 indexed id,
            address caller,
            address indexed onBehalf,
            address indexed receiver,
            uint256 assets,
            uint256 shares
        );
        event Borrow(
            bytes32 indexed id,
            address caller,
            address indexed onBehalf,
            address indexed receiver,
            uint256 assets,
            uint256 shares
        );
        event Repay(
            bytes32 indexed id,
            address indexed caller,
            address indexed onBehalf,
            uint256 assets,
            uint256 shares
        );
    }

    #[sol(rpc)]
    interface IIrm {
        function borrowRateView(MarketParams memory marketParams, Market memory market)
            external
            view
            returns (uint256);
    }

    #[sol(rpc)]
    interface IMetaMorpho {
        function MORPHO() external view returns (address);
        function fee() external view returns (uint96);
        function supplyQueueLength() external view returns (uint256);
        function supplyQueue(uint256 index) external view returns (bytes32);
        function config(bytes32 id) external view returns (MarketConfig memory);
    }
}

impl MarketParams {
    /// The market id: `keccak256(abi.encode(params))`.
    pub fn id(&self) -> B256 {
        keccak256(self.abi_encode())
    }

    /// Markets without an IRM or collateral are idle markets.
    pub fn is_idle(&self) -> bool {
        self.irm.is_zero() || self.collateralToken.is_zero() || self.loanToken.is_zero()
    }
}

impl From<&Market> for MarketState {
    fn from(market: &Market) -> Self {
        Self {
            total_supply_assets: market.totalSupplyAssets,
            total_supply_shares: market.totalSupplyShares,
            total_borrow_assets: market.totalBorrowAssets,
            total_borrow_shares: market.totalBorrowShares,
            last_update: market.lastUpdate,
            fee: market.fee,
        }
    }
}

impl From<&MarketState> for Market {
    fn from(state: &MarketState) -> Self {
        Self {
            totalSupplyAssets: state.total_supply_assets,
            totalSupplyShares: state.total_supply_shares,
            totalBorrowAssets: state.total_borrow_assets,
            totalBorrowShares: state.total_borrow_shares,
            lastUpdate: state.last_update,
            fee: state.fee,
        }
    }
}
