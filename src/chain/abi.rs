//! Contract interfaces used by the compounder.

use alloy_sol_types::sol;

// ============================================
// TOKENS
// ============================================

sol! {
    #[derive(Debug)]
    interface IERC20 {
        event Transfer(address indexed from, address indexed to, uint256 value);

        function totalSupply() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
        function transfer(address recipient, uint256 amount) external returns (bool);
    }

    /// Wrapped native token. Some deployments emit `Withdrawal` instead of a
    /// burn `Transfer` when unwrapping.
    #[derive(Debug)]
    interface IWrappedNative {
        event Withdrawal(address indexed src, uint256 wad);
    }
}

// ============================================
// UNISWAP V2 ROUTER / FACTORY
// ============================================

sol! {
    #[derive(Debug)]
    interface IUniswapV2Router02 {
        function getAmountsOut(uint256 amountIn, address[] path)
            external view returns (uint256[] amounts);

        function swapExactTokensForTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] path,
            address to,
            uint256 deadline
        ) external returns (uint256[] amounts);

        function swapExactTokensForETH(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] path,
            address to,
            uint256 deadline
        ) external returns (uint256[] amounts);

        function swapExactETHForTokens(
            uint256 amountOutMin,
            address[] path,
            address to,
            uint256 deadline
        ) external payable returns (uint256[] amounts);

        function addLiquidity(
            address tokenA,
            address tokenB,
            uint256 amountADesired,
            uint256 amountBDesired,
            uint256 amountAMin,
            uint256 amountBMin,
            address to,
            uint256 deadline
        ) external returns (uint256 amountA, uint256 amountB, uint256 liquidity);
    }

    #[derive(Debug)]
    interface IUniswapV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }

    /// Single-transaction reward to LP conversion.
    #[derive(Debug)]
    interface IZapper {
        function zapInToken(
            address _from,
            uint256 amount,
            address _to,
            address routerAddr,
            address _recipient
        ) external;
    }

    /// Tax office that adds liquidity without the transfer tax.
    #[derive(Debug)]
    interface ITaxOffice {
        function addLiquidityTaxFree(
            address token,
            uint256 amtTomb,
            uint256 amtToken,
            uint256 amtTombMin,
            uint256 amtTokenMin
        ) external returns (uint256, uint256, uint256);
    }
}

// ============================================
// FARMS
// ============================================

sol! {
    /// Pool-id keyed, per-second emission.
    #[derive(Debug)]
    interface ITShareRewardPool {
        function pendingShare(uint256 _pid, address _user) external view returns (uint256);
        function tSharePerSecond() external view returns (uint256);
        function poolInfo(uint256 pid) external view returns (
            address token,
            uint256 allocPoint,
            uint256 lastRewardTime,
            uint256 accTSharePerShare,
            bool isStarted
        );
        function totalAllocPoint() external view returns (uint256);
        function userInfo(uint256 pid, address user) external view returns (uint256 amount, uint256 rewardDebt);
        function deposit(uint256 _pid, uint256 _amount) external;
        function withdraw(uint256 _pid, uint256 _amount) external;
    }

    /// Pool-id keyed, per-second emission with packed pool info.
    #[derive(Debug)]
    interface IPerSecondMasterChef {
        function pendingYel(uint256 _pid, address _user) external view returns (uint256);
        function yelPerSecond() external view returns (uint256);
        function poolInfo(uint256 pid) external view returns (
            address stakingToken,
            uint256 stakingTokenTotalAmount,
            uint256 accYelPerShare,
            uint32 lastRewardTime,
            uint16 allocPoint
        );
        function totalAllocPoint() external view returns (uint256);
        function userInfo(uint256 pid, address user) external view returns (uint256 amount, uint256 rewardDebt);
        function deposit(uint256 _pid, uint256 _amount) external;
        function withdraw(uint256 _pid, uint256 _amount) external;
    }

    /// Single pool, per-block emission.
    #[derive(Debug)]
    interface ISinglePoolPerBlock {
        function pendingReward(address _user) external view returns (uint256);
        function rewardPerBlock() external view returns (uint256);
        function getMultiplier(uint256 _fromBlock, uint256 _toBlock) external view returns (uint256);
        function userInfo(address user) external view returns (uint256 amount, uint256 rewardDebt);
        function deposit(uint256 _amount) external;
        function withdraw(uint256 _amount) external;
    }
}
